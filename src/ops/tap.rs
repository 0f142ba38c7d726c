use std::sync::Arc;

use super::handle::{HandleSink, HandleSubscriber};
use crate::prelude::*;

#[derive(Clone)]
pub struct DoOnNext<S, F> {
  source: S,
  func: Arc<F>,
}

impl<S, F> DoOnNext<S, F> {
  pub(crate) fn new(source: S, func: F) -> Self { Self { source, func: Arc::new(func) } }
}

impl<S, F> Publisher for DoOnNext<S, F>
where
  S: Publisher,
  F: Fn(&S::Item) + Send + Sync + 'static,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let func = self.func.clone();
    let tap = HandleSubscriber::new(
      move |v: S::Item, sink: &mut HandleSink<S::Item>| {
        func(&v);
        sink.next(v)
      },
      subscriber,
    );
    self.source.actual_subscribe(Box::new(tap));
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn sees_items_without_changing_them() {
    let peeked = Arc::new(Mutex::new(vec![]));
    let c_peeked = peeked.clone();
    let ts = TestSubscriber::new();
    publisher::just([1, 2, 3]).do_on_next(move |v| c_peeked.lock().unwrap().push(*v)).subscribe_with(ts.clone());
    assert_eq!(*peeked.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(ts.values(), vec![1, 2, 3]);
  }
}
