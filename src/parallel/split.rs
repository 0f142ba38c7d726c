use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use super::{validate, ParallelPublisher};
use crate::{
  config,
  prelude::*,
  rc::lock,
  subscription::{Demand, Wip},
};

/// Splits one publisher into rails.
///
/// The upstream is subscribed once per `subscribe_rails` with a bounded
/// prefetch. Arriving items are queued and handed out round-robin to the
/// rails that currently have demand, so a slow rail never blocks the others.
/// Upstream demand is topped up once three quarters of the prefetch were
/// handed out.
#[derive(Clone)]
pub struct ParallelSource<S> {
  source: S,
  rails: usize,
}

impl<S> ParallelSource<S> {
  /// `rails == 0` uses the configured parallelism.
  pub(crate) fn new(source: S, rails: usize) -> Self {
    let rails = if rails == 0 { config::global().parallelism } else { rails };
    Self { source, rails }
  }
}

impl<S: Publisher> ParallelPublisher for ParallelSource<S> {
  type Item = S::Item;

  fn parallelism(&self) -> usize { self.rails }

  fn subscribe_rails(&self, mut subscribers: Vec<BoxedSubscriber<S::Item>>) {
    if !validate(self.rails, &mut subscribers) {
      return;
    }
    let config = config::global();
    let split = Arc::new(Split {
      wip: Wip::entered(),
      rails: (0..self.rails)
        .map(|_| Rail { demand: Demand::default(), subscriber: Mutex::new(None) })
        .collect(),
      state: Mutex::new(SplitState {
        queue: VecDeque::new(),
        upstream: None,
        error: None,
        completed: false,
        finished: false,
        next: 0,
        consumed: 0,
      }),
      prefetch: config.prefetch as u64,
      limit: config.replenish_limit(),
    });
    for (index, mut subscriber) in subscribers.into_iter().enumerate() {
      subscriber.on_subscribe(Arc::new(RailSubscription { split: split.clone(), index }));
      *lock(&split.rails[index].subscriber) = Some(subscriber);
    }
    self.source.actual_subscribe(Box::new(SplitInput(split.clone())));
    split.wip.run(|| split.drain());
  }
}

struct Rail<Item> {
  demand: Demand,
  subscriber: Mutex<Option<BoxedSubscriber<Item>>>,
}

impl<Item> Rail<Item> {
  /// Signal this rail unless it was cancelled.
  fn deliver(&self, signal: impl FnOnce(&mut BoxedSubscriber<Item>)) {
    let _delivering = self.demand.deliver();
    if self.demand.is_cancelled() {
      return;
    }
    if let Some(subscriber) = lock(&self.subscriber).as_mut() {
      signal(subscriber);
    }
  }
}

struct SplitState<Item> {
  queue: VecDeque<Item>,
  upstream: Option<SubscriptionRef>,
  error: Option<Error>,
  completed: bool,
  finished: bool,
  /// Rail that gets the next item if it has demand.
  next: usize,
  consumed: usize,
}

struct Split<Item> {
  wip: Wip,
  rails: Vec<Rail<Item>>,
  state: Mutex<SplitState<Item>>,
  prefetch: u64,
  limit: usize,
}

enum Step<Item> {
  Emit(usize, Item, Option<(SubscriptionRef, u64)>),
  Terminate(Option<Error>),
  Cancel(Option<SubscriptionRef>),
  Idle,
}

impl<Item: Send + 'static> Split<Item> {
  fn drain(&self) {
    loop {
      for rail in self.rails.iter().filter(|r| r.demand.is_cancelled()) {
        lock(&rail.subscriber).take();
      }
      match self.next_step() {
        Step::Emit(index, item, replenish) => {
          self.rails[index].deliver(|subscriber| subscriber.on_next(item));
          if let Some((upstream, n)) = replenish {
            upstream.request(n);
          }
        }
        Step::Terminate(err) => {
          for rail in &self.rails {
            rail.deliver(|subscriber| match &err {
              Some(err) => subscriber.on_error(err.clone()),
              None => subscriber.on_complete(),
            });
            lock(&rail.subscriber).take();
          }
          return;
        }
        Step::Cancel(upstream) => {
          if let Some(upstream) = upstream {
            upstream.cancel();
          }
          return;
        }
        Step::Idle => return,
      }
    }
  }

  fn next_step(&self) -> Step<Item> {
    let mut state = lock(&self.state);
    if state.finished {
      return Step::Idle;
    }
    if self.rails.iter().all(|r| r.demand.is_cancelled()) {
      state.finished = true;
      state.queue.clear();
      return Step::Cancel(state.upstream.take());
    }
    if let Some(err) = state.error.take() {
      state.finished = true;
      state.queue.clear();
      return Step::Terminate(Some(err));
    }
    if state.queue.is_empty() {
      if state.completed {
        state.finished = true;
        return Step::Terminate(None);
      }
      return Step::Idle;
    }
    let n = self.rails.len();
    let start = state.next;
    let Some(index) = (0..n).map(|k| (start + k) % n).find(|&i| {
      let demand = &self.rails[i].demand;
      !demand.is_cancelled() && demand.take_one()
    }) else {
      return Step::Idle;
    };
    let Some(item) = state.queue.pop_front() else { return Step::Idle };
    state.next = (index + 1) % n;
    state.consumed += 1;
    let replenish = if state.consumed >= self.limit && !state.completed {
      let batch = std::mem::take(&mut state.consumed) as u64;
      state.upstream.clone().map(|u| (u, batch))
    } else {
      None
    };
    Step::Emit(index, item, replenish)
  }
}

struct RailSubscription<Item> {
  split: Arc<Split<Item>>,
  index: usize,
}

impl<Item: Send + 'static> Subscription for RailSubscription<Item> {
  fn request(&self, n: u64) {
    let demand = &self.split.rails[self.index].demand;
    if n > 0 && !demand.is_cancelled() {
      demand.add(n);
      self.split.wip.drain(|| self.split.drain());
    }
  }

  fn cancel(&self) {
    if self.split.rails[self.index].demand.cancel() {
      self.split.wip.drain(|| self.split.drain());
    }
  }
}

struct SplitInput<Item>(Arc<Split<Item>>);

impl<Item: Send + 'static> SplitInput<Item> {
  fn update(&self, f: impl FnOnce(&mut SplitState<Item>)) {
    {
      let mut state = lock(&self.0.state);
      if state.finished {
        return;
      }
      f(&mut state);
    }
    self.0.wip.drain(|| self.0.drain());
  }
}

impl<Item: Send + 'static> Subscriber<Item> for SplitInput<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let live = {
      let mut state = lock(&self.0.state);
      let live = !state.finished;
      if live {
        state.upstream = Some(subscription.clone());
      }
      live
    };
    if live {
      subscription.request(self.0.prefetch);
    } else {
      subscription.cancel();
    }
  }

  fn on_next(&mut self, item: Item) { self.update(|state| state.queue.push_back(item)); }

  fn on_error(&mut self, err: Error) { self.update(|state| state.error = Some(err)); }

  fn on_complete(&mut self) { self.update(|state| state.completed = true); }
}
