use std::{
  iter::Peekable,
  sync::{Arc, Mutex},
};

use crate::{
  prelude::*,
  rc::lock,
  subscription::{Demand, Wip},
};

/// Creates a publisher that emits the items of `iter`, honouring demand.
///
/// `iter` is cloned for each subscription, so every subscriber sees the full
/// sequence.
///
/// ```
/// use rxflow::prelude::*;
///
/// publisher::from_iter(0..10).subscribe(|v| println!("{v},"));
/// ```
pub fn from_iter<I>(iter: I) -> FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  FromIter(iter)
}

/// Emits the given items in order, then completes.
pub fn just<Item, I>(items: I) -> FromIter<Vec<Item>>
where
  I: IntoIterator<Item = Item>,
  Item: Clone + Send + Sync + 'static,
{
  FromIter(items.into_iter().collect())
}

/// Emits one item, then completes.
pub fn of<Item>(item: Item) -> FromIter<Vec<Item>>
where
  Item: Clone + Send + Sync + 'static,
{
  FromIter(vec![item])
}

/// Emits `count` consecutive integers starting at `start`.
pub fn range(start: i64, count: u64) -> FromIter<std::ops::Range<i64>> {
  let count = i64::try_from(count).unwrap_or(i64::MAX);
  FromIter(start..start.saturating_add(count))
}

#[derive(Clone)]
pub struct FromIter<I>(I);

impl<I> Publisher for FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync + 'static,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  type Item = I::Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<I::Item>) {
    let subscription = Arc::new(IterSubscription {
      demand: Demand::default(),
      wip: Wip::entered(),
      state: Mutex::new(IterState { iter: self.0.clone().into_iter().peekable(), subscriber: None }),
    });
    subscriber.on_subscribe(subscription.clone());
    lock(&subscription.state).subscriber = Some(subscriber);
    subscription.wip.run(|| subscription.emit());
  }
}

struct IterState<It: Iterator> {
  iter: Peekable<It>,
  subscriber: Option<BoxedSubscriber<It::Item>>,
}

struct IterSubscription<It: Iterator> {
  demand: Demand,
  wip: Wip,
  state: Mutex<IterState<It>>,
}

impl<It: Iterator> IterSubscription<It> {
  /// One drain pass: emit while there is demand, complete as soon as the
  /// iterator is exhausted.
  fn emit(&self) {
    let _delivering = self.demand.deliver();
    let mut guard = lock(&self.state);
    let state = &mut *guard;
    let Some(subscriber) = state.subscriber.as_mut() else { return };
    loop {
      if self.demand.is_cancelled() {
        state.subscriber = None;
        return;
      }
      if state.iter.peek().is_none() {
        subscriber.on_complete();
        state.subscriber = None;
        return;
      }
      if !self.demand.take_one() {
        return;
      }
      if let Some(v) = state.iter.next() {
        subscriber.on_next(v);
      }
    }
  }
}

impl<It> Subscription for IterSubscription<It>
where
  It: Iterator + Send,
  It::Item: Send,
{
  fn request(&self, n: u64) {
    if n > 0 && !self.demand.is_cancelled() {
      self.demand.add(n);
      self.wip.drain(|| self.emit());
    }
  }

  fn cancel(&self) {
    if self.demand.cancel() {
      self.wip.drain(|| self.emit());
    }
  }
}
