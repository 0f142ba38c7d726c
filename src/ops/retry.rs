//! `retry`: resubscribe to the source after an error.
//!
//! Items emitted by failed attempts stay delivered; only the subscription
//! starts over. The retry counter belongs to one downstream subscription and
//! starts at zero for each new one.
//!
//! ```rust
//! use std::sync::{
//!   atomic::{AtomicUsize, Ordering},
//!   Arc,
//! };
//!
//! use rxflow::prelude::*;
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let c_calls = calls.clone();
//! let out: Vec<_> = publisher::range(1, 3)
//!   .handle(move |v, sink| {
//!     // the first two items seen overall fail
//!     if c_calls.fetch_add(1, Ordering::SeqCst) < 2 {
//!       sink.error(Error::msg("flaky"));
//!     } else {
//!       sink.next(v);
//!     }
//!   })
//!   .retry(3)
//!   .blocking_iter()
//!   .collect::<Result<_, _>>()
//!   .unwrap();
//! assert_eq!(out, vec![1, 2, 3]);
//! ```
use std::sync::Arc;

use super::resubscribe::{self, Cycle, SharedSource};
use crate::prelude::*;

/// Decides whether an error is retried.
///
/// `usize` is a retry budget: `retry(3)` makes at most four subscriptions in
/// total. Running out of budget ends the sequence with
/// [`Error::RetryExhausted`]; a policy that declines an error for any other
/// reason passes the error on unchanged.
pub trait RetryPolicy: Clone + Send + Sync + 'static {
  /// Whether to resubscribe after `err`. `attempt` is the number of retries
  /// already made for this subscription.
  fn should_retry(&self, err: &Error, attempt: usize) -> bool;

  /// Whether declining at `attempt` means the budget is spent.
  fn is_exhausted(&self, _attempt: usize) -> bool { false }

  /// Whether the retry counter restarts from zero whenever an item is
  /// delivered.
  fn reset_on_success(&self) -> bool { false }
}

impl RetryPolicy for usize {
  fn should_retry(&self, _err: &Error, attempt: usize) -> bool { attempt < *self }

  fn is_exhausted(&self, attempt: usize) -> bool { attempt >= *self }
}

/// Resubscribe forever (or, for `repeat`, after every completion).
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RetryPolicy for Unlimited {
  fn should_retry(&self, _err: &Error, _attempt: usize) -> bool { true }
}

/// Retry only errors matching a predicate, without a budget.
///
/// ```rust
/// use rxflow::{ops::retry::RetryWhen, prelude::*};
///
/// let io_only = RetryWhen(|err: &Error| err.is::<std::io::Error>());
/// # let _ = publisher::of(1).retry(io_only);
/// ```
#[derive(Clone)]
pub struct RetryWhen<F>(pub F);

impl<F> RetryPolicy for RetryWhen<F>
where
  F: Fn(&Error) -> bool + Clone + Send + Sync + 'static,
{
  fn should_retry(&self, err: &Error, _attempt: usize) -> bool { (self.0)(err) }
}

/// A retry budget with optional counter reset.
///
/// ```rust
/// use rxflow::ops::retry::RetryConfig;
///
/// let config = RetryConfig::new().count(5).reset_on_success();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
  count: Option<usize>,
  reset_on_success: bool,
}

impl RetryConfig {
  /// No budget, no reset.
  pub fn new() -> Self { Self::default() }

  /// Allow at most `count` retries.
  pub fn count(mut self, count: usize) -> Self {
    self.count = Some(count);
    self
  }

  /// Restart the counter whenever an item is delivered, so a source that
  /// keeps making progress is retried indefinitely.
  pub fn reset_on_success(mut self) -> Self {
    self.reset_on_success = true;
    self
  }
}

impl RetryPolicy for RetryConfig {
  fn should_retry(&self, _err: &Error, attempt: usize) -> bool {
    self.count.map_or(true, |count| attempt < count)
  }

  fn is_exhausted(&self, attempt: usize) -> bool {
    self.count.map_or(false, |count| attempt >= count)
  }

  fn reset_on_success(&self) -> bool { self.reset_on_success }
}

pub struct Retry<S, P> {
  source: Arc<S>,
  policy: P,
}

impl<S, P: Clone> Clone for Retry<S, P> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), policy: self.policy.clone() } }
}

impl<S, P> Retry<S, P> {
  pub(crate) fn new(source: S, policy: P) -> Self { Self { source: Arc::new(source), policy } }
}

impl<S, P> Publisher for Retry<S, P>
where
  S: Publisher + 'static,
  P: RetryPolicy,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let cycle = RetryCycle {
      source: self.source.clone() as SharedSource<S::Item>,
      policy: self.policy.clone(),
      retries: 0,
    };
    resubscribe::subscribe(cycle, subscriber);
  }
}

struct RetryCycle<Item, P> {
  source: SharedSource<Item>,
  policy: P,
  retries: usize,
}

impl<Item: Send + 'static, P: RetryPolicy> Cycle<Item> for RetryCycle<Item, P> {
  fn source(&mut self) -> SharedSource<Item> { self.source.clone() }

  fn on_error(&mut self, err: Error) -> Option<Error> {
    if self.policy.should_retry(&err, self.retries) {
      self.retries += 1;
      log::debug!("retry #{} after [{}] {err}", self.retries, err.as_label());
      None
    } else if self.policy.is_exhausted(self.retries) {
      Some(Error::RetryExhausted { attempts: self.retries + 1, source: Box::new(err) })
    } else {
      Some(err)
    }
  }

  fn on_complete(&mut self) -> bool { false }

  fn on_item(&mut self) {
    if self.policy.reset_on_success() {
      self.retries = 0;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use super::*;
  use crate::test_subscriber::TestSubscriber;

  /// Counts subscriptions made to the wrapped publisher.
  struct Counting<P> {
    inner: P,
    subscriptions: Arc<AtomicUsize>,
  }

  impl<P: Publisher> Publisher for Counting<P> {
    type Item = P::Item;

    fn actual_subscribe(&self, subscriber: BoxedSubscriber<P::Item>) {
      self.subscriptions.fetch_add(1, Ordering::SeqCst);
      self.inner.actual_subscribe(subscriber);
    }
  }

  fn always_failing(subscriptions: &Arc<AtomicUsize>) -> impl Publisher<Item = i32> {
    Counting {
      inner: publisher::just([1]).concat_with(publisher::error(Error::msg("down"))),
      subscriptions: subscriptions.clone(),
    }
  }

  #[test]
  fn limited_retry_subscribes_k_plus_one_times() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let ts = TestSubscriber::new();
    always_failing(&subscriptions).retry(3).subscribe_with(ts.clone());

    assert_eq!(subscriptions.load(Ordering::SeqCst), 4);
    assert_eq!(ts.values(), vec![1, 1, 1, 1]);
    let errors = ts.errors();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
      Error::RetryExhausted { attempts, source } => {
        assert_eq!(*attempts, 4);
        assert_eq!(source.to_string(), "down");
      }
      other => panic!("unexpected error {other:?}"),
    }
    assert!(!ts.is_completed());
  }

  #[test]
  fn exhausted_budget_keeps_last_failure() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let ts = TestSubscriber::new();
    always_failing(&subscriptions).retry(1).subscribe_with(ts.clone());
    let errors = ts.errors();
    assert_eq!(errors[0].as_label(), "retry_exhausted");
    let last = errors[0].last_failure();
    assert!(matches!(last, Error::Upstream(_)));
    assert_eq!(last.to_string(), "down");
  }

  #[test]
  fn zero_budget_propagates_first_error() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let ts = TestSubscriber::new();
    always_failing(&subscriptions).retry(0).subscribe_with(ts.clone());
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
    assert!(matches!(ts.errors()[0], Error::RetryExhausted { attempts: 1, .. }));
  }

  #[test]
  fn recovers_when_source_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();
    let ts = TestSubscriber::new();
    publisher::range(1, 4)
      .handle(move |v, sink| {
        if c_calls.fetch_add(1, Ordering::SeqCst) == 1 {
          sink.error(Error::msg("once"));
        } else {
          sink.next(v);
        }
      })
      .retry(Unlimited)
      .subscribe_with(ts.clone());
    // 1 was delivered before the failure and is not rolled back
    assert_eq!(ts.values(), vec![1, 1, 2, 3, 4]);
    assert!(ts.is_completed());
    assert!(ts.errors().is_empty());
  }

  #[test]
  fn predicate_rejection_passes_original_error() {
    #[derive(Debug, thiserror::Error)]
    #[error("transient")]
    struct Transient;

    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();
    let ts = TestSubscriber::<i64>::new();
    publisher::range(1, 10)
      .handle(move |_, sink| {
        if c_calls.fetch_add(1, Ordering::SeqCst) < 3 {
          sink.error(Error::upstream(Transient));
        } else {
          sink.error(Error::msg("fatal"));
        }
      })
      .retry(RetryWhen(|err: &Error| err.is::<Transient>()))
      .subscribe_with(ts.clone());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let errors = ts.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "fatal");
  }

  #[test]
  fn counter_is_per_subscription() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let retried = always_failing(&subscriptions).retry(1);
    let first = TestSubscriber::new();
    let second = TestSubscriber::new();
    retried.actual_subscribe(Box::new(first.clone()));
    retried.actual_subscribe(Box::new(second.clone()));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 4);
    assert_eq!(first.values(), vec![1, 1]);
    assert_eq!(second.values(), vec![1, 1]);
  }

  #[test]
  fn retry_keeps_remaining_demand() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();
    let ts = TestSubscriber::with_request(3);
    publisher::range(0, 10)
      .handle(move |v, sink| {
        if c_calls.fetch_add(1, Ordering::SeqCst) == 2 {
          sink.error(Error::msg("once"));
        } else {
          sink.next(v);
        }
      })
      .retry(Unlimited)
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 1, 0]);
    ts.request(2);
    assert_eq!(ts.values(), vec![0, 1, 0, 1, 2]);
  }

  #[test]
  fn reset_on_success_restarts_budget() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();
    let ts = TestSubscriber::new();
    // the second item fails on the first two attempts: two failures against
    // a budget of one, separated by a delivered item
    publisher::range(0, 3)
      .handle(move |v, sink| {
        if matches!(c_calls.fetch_add(1, Ordering::SeqCst), 1 | 3) {
          sink.error(Error::msg("blip"));
        } else {
          sink.next(v);
        }
      })
      .retry(RetryConfig::new().count(1).reset_on_success())
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 0, 0, 1, 2]);
    assert!(ts.is_completed());
  }
}
