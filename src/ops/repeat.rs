use std::sync::Arc;

use super::{
  resubscribe::{self, Cycle, SharedSource},
  retry::Unlimited,
};
use crate::prelude::*;

/// Decides whether a completed source is subscribed again.
///
/// `usize` counts extra cycles: `repeat(2)` emits the sequence three times.
/// Errors are never repeated.
pub trait RepeatPolicy: Clone + Send + Sync + 'static {
  /// `repeated` is the number of extra cycles already made.
  fn should_repeat(&self, repeated: usize) -> bool;
}

impl RepeatPolicy for usize {
  fn should_repeat(&self, repeated: usize) -> bool { repeated < *self }
}

impl RepeatPolicy for Unlimited {
  fn should_repeat(&self, _repeated: usize) -> bool { true }
}

/// Repeat while a predicate over the number of extra cycles made holds.
#[derive(Clone)]
pub struct RepeatWhen<F>(pub F);

impl<F> RepeatPolicy for RepeatWhen<F>
where
  F: Fn(usize) -> bool + Clone + Send + Sync + 'static,
{
  fn should_repeat(&self, repeated: usize) -> bool { (self.0)(repeated) }
}

pub struct Repeat<S, P> {
  source: Arc<S>,
  policy: P,
}

impl<S, P: Clone> Clone for Repeat<S, P> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), policy: self.policy.clone() } }
}

impl<S, P> Repeat<S, P> {
  pub(crate) fn new(source: S, policy: P) -> Self { Self { source: Arc::new(source), policy } }
}

impl<S, P> Publisher for Repeat<S, P>
where
  S: Publisher + 'static,
  P: RepeatPolicy,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let cycle = RepeatCycle {
      source: self.source.clone() as SharedSource<S::Item>,
      policy: self.policy.clone(),
      repeated: 0,
    };
    resubscribe::subscribe(cycle, subscriber);
  }
}

struct RepeatCycle<Item, P> {
  source: SharedSource<Item>,
  policy: P,
  repeated: usize,
}

impl<Item: Send + 'static, P: RepeatPolicy> Cycle<Item> for RepeatCycle<Item, P> {
  fn source(&mut self) -> SharedSource<Item> { self.source.clone() }

  fn on_error(&mut self, err: Error) -> Option<Error> { Some(err) }

  fn on_complete(&mut self) -> bool {
    if self.policy.should_repeat(self.repeated) {
      self.repeated += 1;
      log::debug!("repeat cycle #{}", self.repeated);
      true
    } else {
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_subscriber::TestSubscriber;

  #[test]
  fn limited_repeat_emits_k_plus_one_cycles() {
    let ts = TestSubscriber::new();
    publisher::just([1, 2, 3]).repeat(2).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2, 3, 1, 2, 3, 1, 2, 3]);
    assert_eq!(ts.completions(), 1);
  }

  #[test]
  fn zero_repeat_is_identity() {
    let ts = TestSubscriber::new();
    publisher::just([1, 2]).repeat(0).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2]);
    assert!(ts.is_completed());
  }

  #[test]
  fn unlimited_repeat_follows_demand() {
    let ts = TestSubscriber::with_request(7);
    publisher::just([1, 2, 3]).repeat(Unlimited).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2, 3, 1, 2, 3, 1]);
    ts.cancel();
    ts.request(10);
    assert_eq!(ts.value_count(), 7);
    assert!(!ts.is_terminated());
  }

  #[test]
  fn error_is_not_repeated() {
    let ts = TestSubscriber::new();
    publisher::just([1, 2, 3])
      .concat_with(publisher::error(Error::msg("Any exception to test")))
      .repeat(Unlimited)
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2, 3]);
    assert_eq!(ts.errors().len(), 1);
    assert!(!ts.is_completed());
  }

  #[test]
  fn repeat_when_predicate() {
    let ts = TestSubscriber::new();
    publisher::of('x').repeat(RepeatWhen(|n| n < 4)).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec!['x'; 5]);
  }
}
