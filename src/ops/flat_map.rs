//! `flat_map`: map every item to a publisher and merge the inner items.
use std::{
  panic::{catch_unwind, AssertUnwindSafe},
  sync::Arc,
};

use super::merge::MergeCore;
use crate::{config, prelude::*};

/// Maps every item to an inner publisher and merges what the inners emit in
/// arrival order.
///
/// At most `prefetch` inners are in flight: the outer source is asked for
/// that many items up front and for one more whenever an inner completes.
/// The first error, from the outer source, an inner or a panicking mapper,
/// cancels everything else.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let mut out = publisher::range(1, 3)
///   .flat_map(|v| publisher::range(v * 10, 2))
///   .blocking_iter()
///   .collect::<Result<Vec<_>, _>>()
///   .unwrap();
/// out.sort();
/// assert_eq!(out, vec![10, 11, 20, 21, 30, 31]);
/// ```
#[derive(Clone)]
pub struct FlatMap<S, F> {
  source: S,
  mapper: Arc<F>,
}

impl<S, F> FlatMap<S, F> {
  pub(crate) fn new(source: S, mapper: F) -> Self { Self { source, mapper: Arc::new(mapper) } }
}

impl<S, F, Inner> Publisher for FlatMap<S, F>
where
  S: Publisher,
  F: Fn(S::Item) -> Inner + Send + Sync + 'static,
  Inner: Publisher,
{
  type Item = Inner::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Inner::Item>) {
    MergeCore::subscribe_with(1, subscriber, |core| {
      self.source.actual_subscribe(Box::new(Outer {
        core: core.clone(),
        mapper: self.mapper.clone(),
        upstream: None,
      }));
    });
  }
}

/// Merge slot of the outer source.
const OUTER: usize = 0;

struct Outer<Out, F> {
  core: Arc<MergeCore<Out>>,
  mapper: Arc<F>,
  upstream: Option<SubscriptionRef>,
}

impl<In, Out, F, Inner> Subscriber<In> for Outer<Out, F>
where
  F: Fn(In) -> Inner + Send + Sync,
  Inner: Publisher<Item = Out>,
  Out: Send + 'static,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    if self.core.attach(OUTER, &subscription) {
      self.upstream = Some(subscription.clone());
      subscription.request(config::global().prefetch as u64);
    } else {
      subscription.cancel();
    }
  }

  fn on_next(&mut self, item: In) {
    let Some(upstream) = self.upstream.clone() else { return };
    let mapper = &self.mapper;
    let inner = match catch_unwind(AssertUnwindSafe(|| mapper(item))) {
      Ok(inner) => inner,
      Err(payload) => {
        self.upstream = None;
        upstream.cancel();
        self.core.finish(OUTER, Some(Error::from_panic(payload)));
        return;
      }
    };
    if let Some(input) = self.core.add_input() {
      inner.actual_subscribe(Box::new(InnerInput { input, outer: upstream }));
    }
  }

  fn on_error(&mut self, err: Error) {
    if self.upstream.take().is_some() {
      self.core.finish(OUTER, Some(err));
    }
  }

  fn on_complete(&mut self) {
    if self.upstream.take().is_some() {
      self.core.finish(OUTER, None);
    }
  }
}

/// Feeds one inner publisher into its merge slot and asks the outer source
/// for a replacement when it completes.
struct InnerInput<Out> {
  input: BoxedSubscriber<Out>,
  outer: SubscriptionRef,
}

impl<Out: Send> Subscriber<Out> for InnerInput<Out> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.input.on_subscribe(subscription) }

  fn on_next(&mut self, item: Out) { self.input.on_next(item) }

  fn on_error(&mut self, err: Error) { self.input.on_error(err) }

  fn on_complete(&mut self) {
    self.input.on_complete();
    self.outer.request(1);
  }
}
