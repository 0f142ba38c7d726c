use std::sync::Arc;

use super::resubscribe::{self, Cycle, SharedSource};
use crate::prelude::*;

/// Emits everything from `first`, then subscribes to `second`.
pub struct ConcatWith<A, B> {
  first: Arc<A>,
  second: Arc<B>,
}

impl<A, B> Clone for ConcatWith<A, B> {
  fn clone(&self) -> Self { Self { first: self.first.clone(), second: self.second.clone() } }
}

impl<A, B> ConcatWith<A, B> {
  pub(crate) fn new(first: A, second: B) -> Self {
    Self { first: Arc::new(first), second: Arc::new(second) }
  }
}

impl<A, B> Publisher for ConcatWith<A, B>
where
  A: Publisher + 'static,
  B: Publisher<Item = A::Item> + 'static,
{
  type Item = A::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<A::Item>) {
    let cycle = ConcatCycle {
      sources: [
        self.first.clone() as SharedSource<A::Item>,
        self.second.clone() as SharedSource<A::Item>,
      ],
      index: 0,
    };
    resubscribe::subscribe(cycle, subscriber);
  }
}

struct ConcatCycle<Item> {
  sources: [SharedSource<Item>; 2],
  index: usize,
}

impl<Item: Send + 'static> Cycle<Item> for ConcatCycle<Item> {
  fn source(&mut self) -> SharedSource<Item> { self.sources[self.index].clone() }

  fn on_error(&mut self, err: Error) -> Option<Error> { Some(err) }

  fn on_complete(&mut self) -> bool {
    self.index += 1;
    self.index < self.sources.len()
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn second_follows_first() {
    let ts = TestSubscriber::new();
    publisher::just([1, 2]).concat_with(publisher::just([3])).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2, 3]);
    assert_eq!(ts.completions(), 1);
  }

  #[test]
  fn demand_spans_both_sources() {
    let ts = TestSubscriber::with_request(3);
    publisher::range(0, 2).concat_with(publisher::range(10, 5)).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 1, 10]);
    ts.request(1);
    assert_eq!(ts.values(), vec![0, 1, 10, 11]);
  }

  #[test]
  fn error_in_first_skips_second() {
    let ts = TestSubscriber::<i32>::new();
    publisher::error(Error::msg("first failed"))
      .concat_with(publisher::just([1]))
      .subscribe_with(ts.clone());
    assert!(ts.values().is_empty());
    assert_eq!(ts.errors().len(), 1);
  }
}
