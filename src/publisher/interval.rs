use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc, Mutex,
};

use crate::{
  prelude::*,
  rc::lock,
  scheduler::Duration,
  subscription::Demand,
};

/// Emits `0, 1, 2, ...` every `period` on a worker leased from `scheduler`.
///
/// A tick that finds no outstanding demand ends the sequence with
/// [`Error::Overflow`]. Slow consumers should buffer with `publish_on`.
pub fn interval<S: Scheduler>(period: Duration, scheduler: S) -> Interval<S> {
  Interval { period, scheduler }
}

#[derive(Clone)]
pub struct Interval<S> {
  period: Duration,
  scheduler: S,
}

impl<S: Scheduler> Publisher for Interval<S> {
  type Item = u64;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<u64>) {
    let ticker = Arc::new(Ticker {
      demand: Demand::default(),
      count: AtomicU64::new(0),
      subscriber: Mutex::new(None),
    });
    subscriber.on_subscribe(ticker.clone());
    if ticker.demand.is_cancelled() {
      return;
    }
    *lock(&ticker.subscriber) = Some(subscriber);

    let worker = self.scheduler.create_worker();
    let c_ticker = ticker.clone();
    if let Err(err) = worker.schedule_periodic(self.period, move || c_ticker.tick()) {
      if let Some(mut subscriber) = lock(&ticker.subscriber).take() {
        subscriber.on_error(err);
      }
    }
  }
}

struct Ticker {
  demand: Demand,
  count: AtomicU64,
  subscriber: Mutex<Option<BoxedSubscriber<u64>>>,
}

impl Ticker {
  /// Returns `false` once the sequence is over.
  fn tick(&self) -> bool {
    let _delivering = self.demand.deliver();
    let mut slot = lock(&self.subscriber);
    let Some(subscriber) = slot.as_mut() else { return false };
    if self.demand.is_cancelled() {
      slot.take();
      return false;
    }
    let count = self.count.fetch_add(1, Ordering::Relaxed);
    if self.demand.take_one() {
      subscriber.on_next(count);
      true
    } else {
      subscriber.on_error(Error::Overflow(format!("tick {count}")));
      slot.take();
      false
    }
  }
}

impl Subscription for Ticker {
  fn request(&self, n: u64) {
    if !self.demand.is_cancelled() {
      self.demand.add(n);
    }
  }

  fn cancel(&self) { self.demand.cancel(); }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn ticks_while_demand_lasts() {
    let ts = TestSubscriber::with_request(3);
    publisher::interval(Duration::from_millis(2), schedulers::new_single("interval"))
      .subscribe_with(ts.clone());
    assert!(ts.await_terminal(Duration::from_secs(5)));
    assert_eq!(ts.values(), vec![0, 1, 2]);
    let errors = ts.errors();
    assert!(matches!(errors[0], Error::Overflow(_)));
    assert_eq!(errors[0].to_string(), "could not emit tick 3 due to lack of requests");
  }

  #[test]
  fn cancel_stops_ticking() {
    let ts = TestSubscriber::new();
    publisher::interval(Duration::from_millis(1), schedulers::new_single("interval-cancel"))
      .subscribe_with(ts.clone());
    assert!(ts.await_values(2, Duration::from_secs(5)));
    ts.cancel();
    let seen = ts.value_count();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(ts.value_count(), seen);
    assert!(!ts.is_terminated());
  }

  #[test]
  fn rejected_scheduler_surfaces_error() {
    let scheduler = schedulers::new_single("interval-closed");
    scheduler.dispose();
    let ts = TestSubscriber::new();
    publisher::interval(Duration::from_millis(1), scheduler).subscribe_with(ts.clone());
    assert!(matches!(ts.errors()[0], Error::SchedulerRejected(_)));
  }
}
