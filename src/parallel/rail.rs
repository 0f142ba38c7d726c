use std::sync::Arc;

use super::ParallelPublisher;
use crate::{
  ops::handle::{HandleSink, HandleSubscriber},
  prelude::*,
};

type RailBody<Item, Out> = Arc<dyn Fn(Item, &mut HandleSink<Out>) + Send + Sync>;

/// A per-rail operator: `body` runs on each rail independently, on whatever
/// thread drives that rail.
pub struct RailOp<P: ParallelPublisher, Out> {
  source: P,
  body: RailBody<P::Item, Out>,
}

impl<P: ParallelPublisher + Clone, Out> Clone for RailOp<P, Out> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), body: self.body.clone() } }
}

impl<P: ParallelPublisher, Out> RailOp<P, Out> {
  pub(crate) fn new(source: P, body: RailBody<P::Item, Out>) -> Self { Self { source, body } }
}

impl<P, Out> ParallelPublisher for RailOp<P, Out>
where
  P: ParallelPublisher,
  Out: Send + 'static,
{
  type Item = Out;

  fn parallelism(&self) -> usize { self.source.parallelism() }

  fn subscribe_rails(&self, subscribers: Vec<BoxedSubscriber<Out>>) {
    let rails = subscribers
      .into_iter()
      .map(|rail| {
        let body = self.body.clone();
        Box::new(HandleSubscriber::new(
          move |v: P::Item, sink: &mut HandleSink<Out>| body(v, sink),
          rail,
        )) as BoxedSubscriber<P::Item>
      })
      .collect();
    self.source.subscribe_rails(rails);
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn operators_apply_per_rail() {
    let ts: Vec<TestSubscriber<i64>> = (0..2).map(|_| TestSubscriber::new()).collect();
    publisher::range(0, 6)
      .parallel(2)
      .filter(|v| *v != 4)
      .map(|v| v * 10)
      .do_on_next(|v| assert!(v % 10 == 0))
      .subscribe_rails(ts.iter().map(|r| Box::new(r.clone()) as BoxedSubscriber<i64>).collect());
    assert_eq!(ts[0].values(), vec![0i64, 20]);
    assert_eq!(ts[1].values(), vec![10i64, 30, 50]);
    assert!(ts.iter().all(|r| r.is_completed()));
  }

  #[test]
  fn panic_in_rail_body_fails_that_rail() {
    let ts: Vec<TestSubscriber<i64>> = (0..2).map(|_| TestSubscriber::new()).collect();
    publisher::range(0, 4)
      .parallel(2)
      .map(|v| if v == 1 { panic!("rail one") } else { v })
      .subscribe_rails(ts.iter().map(|r| Box::new(r.clone()) as BoxedSubscriber<i64>).collect());
    assert_eq!(ts[0].values(), vec![0i64, 2, 3]);
    assert!(ts[0].is_completed());
    assert!(matches!(ts[1].errors().as_slice(), [Error::Panicked(_)]));
  }
}
