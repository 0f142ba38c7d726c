use std::sync::Arc;

use super::handle::{HandleSink, HandleSubscriber};
use crate::prelude::*;

#[derive(Clone)]
pub struct Map<S, F> {
  source: S,
  func: Arc<F>,
}

impl<S, F> Map<S, F> {
  pub(crate) fn new(source: S, func: F) -> Self { Self { source, func: Arc::new(func) } }
}

impl<S, F, Out> Publisher for Map<S, F>
where
  S: Publisher,
  F: Fn(S::Item) -> Out + Send + Sync + 'static,
  Out: Send + 'static,
{
  type Item = Out;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Out>) {
    let func = self.func.clone();
    let map = HandleSubscriber::new(
      move |v: S::Item, sink: &mut HandleSink<Out>| sink.next(func(v)),
      subscriber,
    );
    self.source.actual_subscribe(Box::new(map));
  }
}

#[derive(Clone)]
pub struct TryMap<S, F> {
  source: S,
  func: Arc<F>,
}

impl<S, F> TryMap<S, F> {
  pub(crate) fn new(source: S, func: F) -> Self { Self { source, func: Arc::new(func) } }
}

impl<S, F, Out> Publisher for TryMap<S, F>
where
  S: Publisher,
  F: Fn(S::Item) -> Result<Out, Error> + Send + Sync + 'static,
  Out: Send + 'static,
{
  type Item = Out;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Out>) {
    let func = self.func.clone();
    let map = HandleSubscriber::new(
      move |v: S::Item, sink: &mut HandleSink<Out>| match func(v) {
        Ok(v) => sink.next(v),
        Err(err) => sink.error(err),
      },
      subscriber,
    );
    self.source.actual_subscribe(Box::new(map));
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn primitive_type() {
    let ts = TestSubscriber::new();
    publisher::range(0, 5).map(|v| v * 2).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 2, 4, 6, 8]);
    assert!(ts.is_completed());
  }

  #[test]
  fn map_types_mixed() {
    let ts = TestSubscriber::new();
    publisher::just(['a', 'b', 'c']).map(|c| c.to_string()).map(|s| s.len()).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 1, 1]);
  }

  #[test]
  fn demand_passes_through() {
    let ts = TestSubscriber::with_request(2);
    publisher::range(0, 5).map(|v| v + 1).subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2]);
    ts.request(1);
    assert_eq!(ts.values(), vec![1, 2, 3]);
  }

  #[test]
  fn try_map_failure_terminates() {
    let ts = TestSubscriber::new();
    publisher::just(["1", "2", "x", "4"])
      .try_map(|s| s.parse::<i32>().map_err(Error::upstream))
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2]);
    let errors = ts.errors();
    assert!(errors[0].is::<std::num::ParseIntError>());
    assert!(!ts.is_completed());
  }

  #[test]
  fn panicking_map_reports_error() {
    let ts = TestSubscriber::<i64>::new();
    publisher::range(0, 3)
      .map(|v| if v == 2 { panic!("no twos") } else { v })
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 1]);
    assert!(matches!(ts.errors()[0], Error::Panicked(_)));
  }
}
