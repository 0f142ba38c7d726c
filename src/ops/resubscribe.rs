//! Shared machinery of the operators that chain several subscriptions into
//! one downstream sequence: `retry`, `repeat` and `concat_with`.
//!
//! One downstream subscription owns an [`ArbiterSubscription`]. Each attempt
//! subscribes a fresh upstream into it, so the demand the downstream granted
//! and did not receive yet carries over to the next attempt. Resubscription
//! runs in a [`Wip`] loop: a source that terminates synchronously inside
//! `actual_subscribe` adds a loop pass instead of a stack frame.
use std::sync::{Arc, Mutex};

use crate::{
  prelude::*,
  rc::lock,
  subscription::{ArbiterSubscription, Wip},
};

pub(crate) type SharedSource<Item> = Arc<dyn Publisher<Item = Item>>;

/// Per-subscription decisions of a resubscribing operator.
pub(crate) trait Cycle<Item>: Send + 'static {
  /// The publisher to subscribe for the next attempt.
  fn source(&mut self) -> SharedSource<Item>;

  /// `None` starts another attempt, `Some(err)` ends the sequence with it.
  fn on_error(&mut self, err: Error) -> Option<Error>;

  /// `true` starts another attempt, `false` completes the sequence.
  fn on_complete(&mut self) -> bool;

  /// An item of the current attempt reached the downstream.
  fn on_item(&mut self) {}
}

struct Shared<Item, C> {
  arbiter: Arc<ArbiterSubscription>,
  parked: Mutex<Option<BoxedSubscriber<Item>>>,
  cycle: Mutex<C>,
  wip: Wip,
}

/// Start the first attempt for `downstream`.
pub(crate) fn subscribe<Item, C>(cycle: C, mut downstream: BoxedSubscriber<Item>)
where
  Item: Send + 'static,
  C: Cycle<Item>,
{
  let shared = Arc::new(Shared {
    arbiter: Arc::new(ArbiterSubscription::new()),
    parked: Mutex::new(None),
    cycle: Mutex::new(cycle),
    wip: Wip::default(),
  });
  downstream.on_subscribe(shared.arbiter.clone());
  park_and_resubscribe(&shared, downstream);
}

fn park_and_resubscribe<Item, C>(shared: &Arc<Shared<Item, C>>, downstream: BoxedSubscriber<Item>)
where
  Item: Send + 'static,
  C: Cycle<Item>,
{
  *lock(&shared.parked) = Some(downstream);
  shared.wip.drain(|| {
    let Some(downstream) = lock(&shared.parked).take() else { return };
    if shared.arbiter.is_cancelled() {
      return;
    }
    let source = lock(&shared.cycle).source();
    source.actual_subscribe(Box::new(Attempt { shared: shared.clone(), downstream: Some(downstream) }));
  });
}

/// Subscriber of one attempt. Holds the downstream while the attempt runs
/// and parks it again when the attempt ends in a resubscription.
struct Attempt<Item, C> {
  shared: Arc<Shared<Item, C>>,
  downstream: Option<BoxedSubscriber<Item>>,
}

impl<Item, C> Attempt<Item, C> {
  /// Drops the downstream once the sequence was cancelled.
  fn live(&mut self) -> bool {
    if self.shared.arbiter.is_cancelled() {
      self.downstream = None;
    }
    self.downstream.is_some()
  }
}

impl<Item, C> Subscriber<Item> for Attempt<Item, C>
where
  Item: Send + 'static,
  C: Cycle<Item>,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.shared.arbiter.set(subscription); }

  fn on_next(&mut self, item: Item) {
    if !self.live() {
      return;
    }
    if let Some(downstream) = self.downstream.as_mut() {
      self.shared.arbiter.produced(1);
      lock(&self.shared.cycle).on_item();
      downstream.on_next(item);
    }
  }

  fn on_error(&mut self, err: Error) {
    if !self.live() {
      return;
    }
    let Some(mut downstream) = self.downstream.take() else { return };
    let decision = lock(&self.shared.cycle).on_error(err);
    match decision {
      Some(err) => downstream.on_error(err),
      None => {
        log::debug!("resubscribing after error");
        park_and_resubscribe(&self.shared, downstream)
      }
    }
  }

  fn on_complete(&mut self) {
    if !self.live() {
      return;
    }
    let Some(mut downstream) = self.downstream.take() else { return };
    let again = lock(&self.shared.cycle).on_complete();
    if again {
      log::debug!("resubscribing after completion");
      park_and_resubscribe(&self.shared, downstream);
    } else {
      downstream.on_complete();
    }
  }
}
