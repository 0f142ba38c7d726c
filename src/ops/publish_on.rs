use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use crate::{
  config,
  prelude::*,
  rc::lock,
  scheduler::Worker,
  subscription::{Demand, EmptySubscription, Wip},
};

/// Delivers every signal from this point of the chain on a worker of the
/// scheduler.
///
/// Upstream items are prefetched into a queue and drained on the worker as
/// downstream demand allows. Upstream demand is topped up in batches of three
/// quarters of the prefetch. A terminal signal is delivered after the queued
/// items.
#[derive(Clone)]
pub struct PublishOn<S, Sch> {
  source: S,
  scheduler: Sch,
}

impl<S, Sch> PublishOn<S, Sch> {
  pub(crate) fn new(source: S, scheduler: Sch) -> Self { Self { source, scheduler } }
}

impl<S, Sch> Publisher for PublishOn<S, Sch>
where
  S: Publisher,
  Sch: Scheduler + Clone,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let worker = self.scheduler.create_worker();
    self.source.actual_subscribe(publish_on_subscriber(subscriber, worker));
  }
}

/// Wrap `downstream` so that it is driven from `worker`.
pub(crate) fn publish_on_subscriber<Item: Send + 'static>(
  downstream: BoxedSubscriber<Item>,
  worker: Worker,
) -> BoxedSubscriber<Item> {
  if worker.is_disposed() {
    return Box::new(Rejected { downstream: Some(downstream), worker });
  }
  let config = config::global();
  Box::new(PublishOnSubscriber(Arc::new(Hop {
    worker,
    demand: Demand::default(),
    wip: Wip::default(),
    queue: Mutex::new(Queue { items: VecDeque::new(), terminal: None }),
    upstream: Mutex::new(None),
    downstream: Mutex::new(Some(downstream)),
    prefetch: config.prefetch,
    limit: config.replenish_limit(),
    consumed: Mutex::new(0),
  })))
}

struct Queue<Item> {
  items: VecDeque<Item>,
  terminal: Option<Option<Error>>,
}

struct Hop<Item> {
  worker: Worker,
  demand: Demand,
  wip: Wip,
  queue: Mutex<Queue<Item>>,
  upstream: Mutex<Option<SubscriptionRef>>,
  downstream: Mutex<Option<BoxedSubscriber<Item>>>,
  prefetch: usize,
  limit: usize,
  consumed: Mutex<usize>,
}

impl<Item: Send + 'static> Hop<Item> {
  fn schedule_drain(self: &Arc<Self>) {
    if !self.wip.enter() {
      return;
    }
    let hop = self.clone();
    if let Err(err) = self.worker.schedule(Box::new(move || hop.wip.run(|| hop.drain()))) {
      // the drain loop stays owned here, so nothing is delivered afterwards
      let upstream = lock(&self.upstream).take();
      if let Some(upstream) = upstream {
        upstream.cancel();
      }
      if let Some(mut downstream) = lock(&self.downstream).take() {
        downstream.on_error(err);
      }
    }
  }

  /// Runs on the worker only.
  fn drain(&self) {
    let _delivering = self.demand.deliver();
    let mut slot = lock(&self.downstream);
    let Some(downstream) = slot.as_mut() else { return };
    loop {
      if self.demand.is_cancelled() {
        lock(&self.queue).items.clear();
        slot.take();
        return;
      }
      let mut queue = lock(&self.queue);
      if queue.items.is_empty() {
        if let Some(terminal) = queue.terminal.take() {
          drop(queue);
          match terminal {
            Some(err) => downstream.on_error(err),
            None => downstream.on_complete(),
          }
          slot.take();
        }
        return;
      }
      if !self.demand.take_one() {
        return;
      }
      let Some(item) = queue.items.pop_front() else { return };
      drop(queue);
      downstream.on_next(item);
      self.replenish();
    }
  }

  fn replenish(&self) {
    let batch = {
      let mut consumed = lock(&self.consumed);
      *consumed += 1;
      if *consumed < self.limit {
        return;
      }
      std::mem::take(&mut *consumed)
    };
    let upstream = lock(&self.upstream).clone();
    if let Some(upstream) = upstream {
      upstream.request(batch as u64);
    }
  }
}

struct PublishOnSubscriber<Item>(Arc<Hop<Item>>);

impl<Item: Send + 'static> Subscriber<Item> for PublishOnSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    *lock(&self.0.upstream) = Some(subscription.clone());
    // not locked across the call: a request may have to report a rejection
    let downstream = lock(&self.0.downstream).take();
    if let Some(mut downstream) = downstream {
      downstream.on_subscribe(Arc::new(PublishOnSubscription(self.0.clone())));
      *lock(&self.0.downstream) = Some(downstream);
    }
    if self.0.demand.is_cancelled() {
      subscription.cancel();
    } else {
      subscription.request(self.0.prefetch as u64);
    }
  }

  fn on_next(&mut self, item: Item) {
    lock(&self.0.queue).items.push_back(item);
    self.0.schedule_drain();
  }

  fn on_error(&mut self, err: Error) {
    lock(&self.0.queue).terminal.get_or_insert(Some(err));
    self.0.schedule_drain();
  }

  fn on_complete(&mut self) {
    lock(&self.0.queue).terminal.get_or_insert(None);
    self.0.schedule_drain();
  }
}

/// Stands in when the worker was already disposed at subscribe time.
struct Rejected<Item> {
  downstream: Option<BoxedSubscriber<Item>>,
  worker: Worker,
}

impl<Item: Send> Subscriber<Item> for Rejected<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    subscription.cancel();
    if let Some(mut downstream) = self.downstream.take() {
      downstream.on_subscribe(EmptySubscription::shared());
      downstream.on_error(Error::SchedulerRejected(format!(
        "worker {} is disposed",
        self.worker.name()
      )));
    }
  }

  fn on_next(&mut self, _item: Item) {}

  fn on_error(&mut self, _err: Error) {}

  fn on_complete(&mut self) {}
}

struct PublishOnSubscription<Item>(Arc<Hop<Item>>);

impl<Item: Send + 'static> Subscription for PublishOnSubscription<Item> {
  fn request(&self, n: u64) {
    if n > 0 && !self.0.demand.is_cancelled() {
      self.0.demand.add(n);
      self.0.schedule_drain();
    }
  }

  fn cancel(&self) {
    if self.0.demand.cancel() {
      let upstream = lock(&self.0.upstream).take();
      if let Some(upstream) = upstream {
        upstream.cancel();
      }
      self.0.schedule_drain();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn signals_hop_to_worker() {
    let ts = TestSubscriber::new();
    publisher::range(0, 1000).publish_on(schedulers::new_single("hop")).subscribe_with(ts.clone());
    assert!(ts.await_terminal(Duration::from_secs(5)));
    assert_eq!(ts.values(), (0..1000).collect::<Vec<_>>());
    assert!(ts.threads().iter().all(|t| t.as_deref() == Some("hop-0")));
    assert_eq!(ts.violations(), 0);
  }

  #[test]
  fn operators_before_hop_stay_on_caller() {
    let caller = std::thread::current().name().map(str::to_owned);
    let seen_before = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
    let c_seen = seen_before.clone();
    let ts = TestSubscriber::new();
    publisher::range(0, 3)
      .do_on_next(move |_| c_seen.lock().unwrap().push(std::thread::current().name().map(str::to_owned)))
      .publish_on(schedulers::new_single("after"))
      .subscribe_with(ts.clone());
    assert!(ts.await_terminal(Duration::from_secs(5)));
    assert!(seen_before.lock().unwrap().iter().all(|t| *t == caller));
    assert!(ts.threads().iter().all(|t| t.as_deref() == Some("after-0")));
  }

  #[test]
  fn successive_hops() {
    let ts = TestSubscriber::new();
    publisher::range(0, 10)
      .publish_on(schedulers::new_single("first"))
      .map(|v| (v, std::thread::current().name().map(str::to_owned)))
      .publish_on(schedulers::new_single("second"))
      .subscribe_with(ts.clone());
    assert!(ts.await_terminal(Duration::from_secs(5)));
    assert!(ts.values().iter().all(|(_, t)| t.as_deref() == Some("first-0")));
    assert!(ts.threads().iter().all(|t| t.as_deref() == Some("second-0")));
  }

  #[test]
  fn respects_demand_across_hop() {
    let ts = TestSubscriber::with_request(3);
    publisher::range(0, 100).publish_on(schedulers::new_single("slow")).subscribe_with(ts.clone());
    assert!(ts.await_values(3, Duration::from_secs(5)));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(ts.values(), vec![0, 1, 2]);
    ts.request(2);
    assert!(ts.await_values(5, Duration::from_secs(5)));
    assert_eq!(ts.value_count(), 5);
  }

  #[test]
  fn error_after_items() {
    let ts = TestSubscriber::new();
    publisher::just([1, 2])
      .concat_with(publisher::error(Error::msg("late")))
      .publish_on(schedulers::new_single("err"))
      .subscribe_with(ts.clone());
    assert!(ts.await_terminal(Duration::from_secs(5)));
    assert_eq!(ts.values(), vec![1, 2]);
    assert_eq!(ts.errors().len(), 1);
  }

  #[test]
  fn disposed_scheduler_is_reported() {
    let scheduler = schedulers::new_single("publish-closed");
    scheduler.dispose();
    let ts = TestSubscriber::<i64>::new();
    publisher::range(0, 3).publish_on(scheduler).subscribe_with(ts.clone());
    assert!(matches!(ts.errors()[0], Error::SchedulerRejected(_)));
    assert!(ts.values().is_empty());
  }

  #[test]
  fn cancel_discards_queued_signals() {
    let ts = TestSubscriber::with_request(1);
    publisher::range(0, 100).publish_on(schedulers::new_single("cancel")).subscribe_with(ts.clone());
    assert!(ts.await_values(1, Duration::from_secs(5)));
    ts.cancel();
    ts.request(50);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(ts.values(), vec![0]);
    assert!(!ts.is_terminated());
  }
}
