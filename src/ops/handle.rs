//! `handle`: the per-item decision operator that `map`, `try_map`, `filter`
//! and `do_on_next` are built on.
use std::{
  marker::PhantomData,
  panic::{catch_unwind, AssertUnwindSafe},
  sync::Arc,
};

use crate::prelude::*;

/// Collects what a `handle` body decided for one upstream item.
///
/// At most one item may be emitted per upstream item; a second `next` turns
/// into an error. An emitted item is delivered before a terminal signal
/// raised in the same call.
pub struct HandleSink<Out> {
  item: Option<Out>,
  end: Option<Option<Error>>,
}

impl<Out> HandleSink<Out> {
  fn new() -> Self { Self { item: None, end: None } }

  pub fn next(&mut self, item: Out) {
    if self.end.is_some() {
      return;
    }
    if self.item.is_some() {
      self.end = Some(Some(Error::msg("handle emitted more than one item for one upstream item")));
    } else {
      self.item = Some(item);
    }
  }

  pub fn error(&mut self, err: Error) {
    if self.end.is_none() {
      self.end = Some(Some(err));
    }
  }

  pub fn complete(&mut self) {
    if self.end.is_none() {
      self.end = Some(None);
    }
  }
}

pub struct Handle<S, F, Out> {
  source: S,
  body: Arc<F>,
  _out: PhantomData<fn() -> Out>,
}

impl<S: Clone, F, Out> Clone for Handle<S, F, Out> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), body: self.body.clone(), _out: PhantomData }
  }
}

impl<S, F, Out> Handle<S, F, Out> {
  pub(crate) fn new(source: S, body: F) -> Self {
    Self { source, body: Arc::new(body), _out: PhantomData }
  }
}

impl<S, F, Out> Publisher for Handle<S, F, Out>
where
  S: Publisher,
  F: Fn(S::Item, &mut HandleSink<Out>) + Send + Sync + 'static,
  Out: Send + 'static,
{
  type Item = Out;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Out>) {
    let body = self.body.clone();
    let handle =
      HandleSubscriber::new(move |v: S::Item, sink: &mut HandleSink<Out>| body(v, sink), subscriber);
    self.source.actual_subscribe(Box::new(handle));
  }
}

/// Runs a body per item and turns its decision into downstream signals.
///
/// Demand passes through 1:1: the downstream receives the upstream
/// subscription directly, and an item that produced nothing is replaced by
/// requesting one more from upstream. Once the body errors, completes or
/// panics, upstream is cancelled and later upstream signals are ignored.
pub(crate) struct HandleSubscriber<Item, Out, B> {
  body: B,
  downstream: BoxedSubscriber<Out>,
  upstream: Option<SubscriptionRef>,
  done: bool,
  _item: PhantomData<fn(Item)>,
}

impl<Item, Out, B> HandleSubscriber<Item, Out, B>
where
  B: Fn(Item, &mut HandleSink<Out>),
{
  pub(crate) fn new(body: B, downstream: BoxedSubscriber<Out>) -> Self {
    Self { body, downstream, upstream: None, done: false, _item: PhantomData }
  }

  fn terminate(&mut self, err: Option<Error>) {
    self.done = true;
    if let Some(upstream) = self.upstream.take() {
      upstream.cancel();
    }
    match err {
      Some(err) => self.downstream.on_error(err),
      None => self.downstream.on_complete(),
    }
  }
}

impl<Item, Out, B> Subscriber<Item> for HandleSubscriber<Item, Out, B>
where
  B: Fn(Item, &mut HandleSink<Out>) + Send,
  Out: Send,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    self.upstream = Some(subscription.clone());
    self.downstream.on_subscribe(subscription);
  }

  fn on_next(&mut self, item: Item) {
    if self.done {
      return;
    }
    let mut sink = HandleSink::new();
    let body = &self.body;
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| body(item, &mut sink))) {
      self.terminate(Some(Error::from_panic(payload)));
      return;
    }
    let HandleSink { item, end } = sink;
    let emitted = item.is_some();
    if let Some(v) = item {
      self.downstream.on_next(v);
    }
    match end {
      Some(err) => self.terminate(err),
      None if !emitted => {
        if let Some(upstream) = &self.upstream {
          upstream.request(1);
        }
      }
      None => {}
    }
  }

  fn on_error(&mut self, err: Error) {
    if !self.done {
      self.done = true;
      self.downstream.on_error(err);
    }
  }

  fn on_complete(&mut self) {
    if !self.done {
      self.done = true;
      self.downstream.on_complete();
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn item_then_terminal_in_one_call() {
    let ts = TestSubscriber::new();
    publisher::range(1, 10)
      .handle(|v, sink| {
        sink.next(v);
        if v == 3 {
          sink.complete();
        }
      })
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1, 2, 3]);
    assert_eq!(ts.completions(), 1);
  }

  #[test]
  fn dropped_items_are_replaced_from_upstream() {
    let ts = TestSubscriber::with_request(2);
    publisher::range(1, 10)
      .handle(|v, sink| {
        if v % 3 == 0 {
          sink.next(v);
        }
      })
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![3, 6]);
    assert!(!ts.is_completed());
    ts.request(1);
    assert_eq!(ts.values(), vec![3, 6, 9]);
  }

  #[test]
  fn error_from_body_cancels_upstream() {
    let emitted = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let c_emitted = emitted.clone();
    let ts = TestSubscriber::<i64>::new();
    publisher::range(0, 100)
      .do_on_next(move |_| {
        c_emitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      })
      .handle(|v, sink| if v == 2 { sink.error(Error::msg("bad item")) } else { sink.next(v) })
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 1]);
    assert_eq!(ts.errors().len(), 1);
    assert_eq!(emitted.load(std::sync::atomic::Ordering::SeqCst), 3);
  }

  #[test]
  fn panic_becomes_single_error() {
    let ts = TestSubscriber::<i64>::new();
    publisher::range(0, 5)
      .handle(|v, sink| {
        if v == 1 {
          panic!("body exploded");
        }
        sink.next(v)
      })
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0]);
    let errors = ts.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::Panicked(msg) if msg == "body exploded"));
    assert_eq!(ts.violations(), 0);
  }

  #[test]
  fn second_next_is_an_error() {
    let ts = TestSubscriber::new();
    publisher::of(1)
      .handle(|v, sink| {
        sink.next(v);
        sink.next(v);
      })
      .subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![1]);
    assert_eq!(ts.errors().len(), 1);
  }
}
