//! Recording subscriber for tests.
//!
//! [`TestSubscriber`] records every signal it receives, lets the test drive
//! demand by hand, and can block until the sequence terminates when the
//! chain runs on other threads.
//!
//! ```rust
//! use rxflow::{prelude::*, test_subscriber::TestSubscriber};
//!
//! let ts = TestSubscriber::with_request(0);
//! publisher::just([1, 2, 3]).subscribe_with(ts.clone());
//! ts.request(2);
//! assert_eq!(ts.values(), vec![1, 2]);
//! ```
use std::{
  sync::{Arc, Condvar, Mutex},
  thread,
  time::Duration,
};

use crate::{
  error::Error,
  rc::lock,
  subscriber::Subscriber,
  subscription::{SubscriptionRef, UNBOUNDED},
};

struct Record<Item> {
  values: Vec<Item>,
  errors: Vec<Error>,
  completions: usize,
  threads: Vec<Option<String>>,
  violations: usize,
  subscription: Option<SubscriptionRef>,
}

struct Inner<Item> {
  record: Mutex<Record<Item>>,
  changed: Condvar,
  initial_request: u64,
  request_on_next: u64,
}

/// A subscriber whose clones share one record.
pub struct TestSubscriber<Item> {
  inner: Arc<Inner<Item>>,
}

impl<Item> Clone for TestSubscriber<Item> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<Item> Default for TestSubscriber<Item> {
  fn default() -> Self { Self::new() }
}

impl<Item> TestSubscriber<Item> {
  /// Subscriber that requests unbounded demand on subscribe.
  pub fn new() -> Self { Self::with_request(UNBOUNDED) }

  /// Subscriber that requests `n` on subscribe (`0` requests nothing).
  pub fn with_request(n: u64) -> Self { Self::build(n, 0) }

  /// Also request `n` more after every received item.
  pub fn request_on_next(self, n: u64) -> Self { Self::build(self.inner.initial_request, n) }

  fn build(initial_request: u64, request_on_next: u64) -> Self {
    Self {
      inner: Arc::new(Inner {
        record: Mutex::new(Record {
          values: vec![],
          errors: vec![],
          completions: 0,
          threads: vec![],
          violations: 0,
          subscription: None,
        }),
        changed: Condvar::new(),
        initial_request,
        request_on_next,
      }),
    }
  }

  fn subscription(&self) -> Option<SubscriptionRef> { lock(&self.inner.record).subscription.clone() }

  pub fn request(&self, n: u64) {
    if let Some(s) = self.subscription() {
      s.request(n);
    }
  }

  pub fn cancel(&self) {
    if let Some(s) = self.subscription() {
      s.cancel();
    }
  }

  pub fn is_subscribed(&self) -> bool { self.subscription().is_some() }

  pub fn values(&self) -> Vec<Item>
  where
    Item: Clone,
  {
    lock(&self.inner.record).values.clone()
  }

  pub fn value_count(&self) -> usize { lock(&self.inner.record).values.len() }

  pub fn errors(&self) -> Vec<Error> { lock(&self.inner.record).errors.clone() }

  pub fn completions(&self) -> usize { lock(&self.inner.record).completions }

  pub fn is_completed(&self) -> bool { self.completions() > 0 }

  pub fn is_terminated(&self) -> bool {
    let record = lock(&self.inner.record);
    record.completions > 0 || !record.errors.is_empty()
  }

  /// Names of the threads each `on_next` ran on.
  pub fn threads(&self) -> Vec<Option<String>> { lock(&self.inner.record).threads.clone() }

  /// Signals received after a terminal signal, or a second terminal.
  pub fn violations(&self) -> usize { lock(&self.inner.record).violations }

  /// Block until a terminal signal arrives. Returns `false` on timeout.
  pub fn await_terminal(&self, timeout: Duration) -> bool {
    self.await_until(timeout, |r| r.completions > 0 || !r.errors.is_empty())
  }

  /// Block until at least `n` items arrived. Returns `false` on timeout.
  pub fn await_values(&self, n: usize, timeout: Duration) -> bool {
    self.await_until(timeout, |r| r.values.len() >= n)
  }

  fn await_until(&self, timeout: Duration, done: impl Fn(&Record<Item>) -> bool) -> bool {
    let guard = lock(&self.inner.record);
    let (guard, _) = self
      .inner
      .changed
      .wait_timeout_while(guard, timeout, |r| !done(r))
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    done(&guard)
  }
}

impl<Item: Send> Subscriber<Item> for TestSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    lock(&self.inner.record).subscription = Some(subscription.clone());
    if self.inner.initial_request > 0 {
      subscription.request(self.inner.initial_request);
    }
  }

  fn on_next(&mut self, item: Item) {
    let subscription = {
      let mut record = lock(&self.inner.record);
      if record.completions > 0 || !record.errors.is_empty() {
        record.violations += 1;
      }
      record.values.push(item);
      record.threads.push(thread::current().name().map(str::to_owned));
      record.subscription.clone()
    };
    self.inner.changed.notify_all();
    if self.inner.request_on_next > 0 {
      if let Some(s) = subscription {
        s.request(self.inner.request_on_next);
      }
    }
  }

  fn on_error(&mut self, err: Error) {
    {
      let mut record = lock(&self.inner.record);
      if record.completions > 0 || !record.errors.is_empty() {
        record.violations += 1;
      }
      record.errors.push(err);
    }
    self.inner.changed.notify_all();
  }

  fn on_complete(&mut self) {
    {
      let mut record = lock(&self.inner.record);
      if record.completions > 0 || !record.errors.is_empty() {
        record.violations += 1;
      }
      record.completions += 1;
    }
    self.inner.changed.notify_all();
  }
}
