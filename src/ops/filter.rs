use std::sync::Arc;

use super::handle::{HandleSink, HandleSubscriber};
use crate::prelude::*;

/// Emits only the items that pass a predicate.
///
/// A rejected item does not use up downstream demand; one more item is
/// requested from upstream in its place.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let evens: Vec<_> =
///   publisher::range(0, 10).filter(|v| v % 2 == 0).blocking_iter().map(Result::unwrap).collect();
/// assert_eq!(evens, vec![0, 2, 4, 6, 8]);
/// ```
#[derive(Clone)]
pub struct Filter<S, F> {
  source: S,
  predicate: Arc<F>,
}

impl<S, F> Filter<S, F> {
  pub(crate) fn new(source: S, predicate: F) -> Self {
    Self { source, predicate: Arc::new(predicate) }
  }
}

impl<S, F> Publisher for Filter<S, F>
where
  S: Publisher,
  F: Fn(&S::Item) -> bool + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let predicate = self.predicate.clone();
    let filter = HandleSubscriber::new(
      move |v: S::Item, sink: &mut HandleSink<S::Item>| {
        if predicate(&v) {
          sink.next(v)
        }
      },
      subscriber,
    );
    self.source.actual_subscribe(Box::new(filter));
  }
}
