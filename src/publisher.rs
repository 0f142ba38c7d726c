//! Publishers and the operator surface.
//!
//! A [`Publisher`] is cold and re-subscribable: every `actual_subscribe`
//! starts an independent logical subscription. Operators wrap an upstream
//! publisher and, at subscribe time, wrap the downstream subscriber in an
//! adapter. [`PublisherExt`] puts every operator and terminal entry point on
//! all publishers.
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let seen = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
//! let c_seen = seen.clone();
//! publisher::just([1, 2, 3])
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v.to_string())
//!   .subscribe(move |v| c_seen.lock().unwrap().push(v));
//! assert_eq!(*seen.lock().unwrap(), vec!["2".to_owned()]);
//! ```
use std::sync::Arc;

use crate::{
  connectable::{ConnectableSource, ReplayPolicy},
  error::Error,
  ops::{
    collect::CollectVec,
    concat::ConcatWith,
    filter::Filter,
    flat_map::FlatMap,
    handle::{Handle, HandleSink},
    into_stream::{BlockingIter, SubscriberStream},
    log::Log,
    map::{Map, TryMap},
    merge::MergeWith,
    publish_on::PublishOn,
    repeat::{Repeat, RepeatPolicy},
    retry::{Retry, RetryPolicy},
    subscribe_on::SubscribeOn,
    tap::DoOnNext,
  },
  parallel::ParallelSource,
  scheduler::{Duration, Scheduler},
  subscriber::{BoxedSubscriber, LambdaSubscriber, NoCompleteHandler, NoErrorHandler, Subscriber},
  subscription::Disposable,
};

mod from_iter;
#[cfg(feature = "timer")]
mod interval;
mod trivial;

pub use from_iter::{from_iter, just, of, range, FromIter};
#[cfg(feature = "timer")]
pub use interval::{interval, Interval};
pub use trivial::{empty, error, never, Empty, Never, Throw};

/// A producer of a sequence of items for any number of independent
/// subscriptions.
pub trait Publisher: Send + Sync {
  type Item: Send + 'static;

  /// Start one logical subscription delivering to `subscriber`.
  ///
  /// The publisher must call `on_subscribe` first and never deliver more
  /// `on_next` than the subscriber requested.
  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>);
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
  type Item = P::Item;

  #[inline]
  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    (**self).actual_subscribe(subscriber)
  }
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
  type Item = P::Item;

  #[inline]
  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    (**self).actual_subscribe(subscriber)
  }
}

/// Type-erased publisher.
pub type BoxedPublisher<Item> = Box<dyn Publisher<Item = Item>>;

pub trait PublisherExt: Publisher + Sized {
  /// Transform every item with `f`.
  fn map<Out, F>(self, f: F) -> Map<Self, F>
  where
    F: Fn(Self::Item) -> Out + Send + Sync + 'static,
    Out: Send + 'static,
  {
    Map::new(self, f)
  }

  /// Transform every item with a fallible `f`; an `Err` terminates the
  /// sequence with that error.
  fn try_map<Out, F>(self, f: F) -> TryMap<Self, F>
  where
    F: Fn(Self::Item) -> Result<Out, Error> + Send + Sync + 'static,
    Out: Send + 'static,
  {
    TryMap::new(self, f)
  }

  /// Drop items failing `predicate` without consuming downstream demand.
  fn filter<F>(self, predicate: F) -> Filter<Self, F>
  where
    F: Fn(&Self::Item) -> bool + Send + Sync + 'static,
  {
    Filter::new(self, predicate)
  }

  /// Decide per item whether to emit nothing, one item, an error or
  /// completion.
  ///
  /// ```rust
  /// use rxflow::prelude::*;
  ///
  /// let out = publisher::range(1, 6)
  ///   .handle(|v, sink| {
  ///     if v == 5 {
  ///       sink.complete();
  ///     } else if v % 2 == 1 {
  ///       sink.next(v * 10);
  ///     }
  ///   })
  ///   .blocking_iter()
  ///   .collect::<Result<Vec<_>, _>>();
  /// assert_eq!(out.unwrap(), vec![10, 30]);
  /// ```
  fn handle<Out, F>(self, body: F) -> Handle<Self, F, Out>
  where
    F: Fn(Self::Item, &mut HandleSink<Out>) + Send + Sync + 'static,
    Out: Send + 'static,
  {
    Handle::new(self, body)
  }

  /// Invoke `f` for each item before passing it on.
  fn do_on_next<F>(self, f: F) -> DoOnNext<Self, F>
  where
    F: Fn(&Self::Item) + Send + Sync + 'static,
  {
    DoOnNext::new(self, f)
  }

  /// Log every signal, request and cancel at `info` level under the log
  /// target `category`.
  fn log(self, category: impl Into<String>) -> Log<Self>
  where
    Self::Item: std::fmt::Debug,
  {
    Log::new(self, category)
  }

  /// Resubscribe after an error while `policy` allows it.
  ///
  /// `usize` is a retry budget, [`Unlimited`](crate::ops::retry::Unlimited)
  /// never gives up, and [`RetryWhen`](crate::ops::retry::RetryWhen)
  /// retries only errors matching a predicate.
  ///
  /// When a budget runs out, the last error arrives wrapped in
  /// [`Error::RetryExhausted`] together with the number of attempts.
  /// [`Error::last_failure`] and [`Error::downcast_ref`] reach the wrapped
  /// error. An error a predicate declines is passed on as it is.
  fn retry<P: RetryPolicy>(self, policy: P) -> Retry<Self, P> { Retry::new(self, policy) }

  /// Resubscribe after completion while `policy` allows it. Errors are never
  /// repeated.
  fn repeat<P: RepeatPolicy>(self, policy: P) -> Repeat<Self, P> { Repeat::new(self, policy) }

  /// Emit all items of `self`, then all items of `other`.
  fn concat_with<O>(self, other: O) -> ConcatWith<Self, O>
  where
    O: Publisher<Item = Self::Item>,
  {
    ConcatWith::new(self, other)
  }

  /// Subscribe to `self` and `other` at once and interleave their items
  /// by arrival.
  fn merge_with<O>(self, other: O) -> MergeWith<Self, O>
  where
    O: Publisher<Item = Self::Item>,
  {
    MergeWith::new(self, other)
  }

  /// Map every item to a publisher and merge the inner items by arrival.
  ///
  /// Inners that `subscribe_on` a scheduler run concurrently.
  fn flat_map<Inner, F>(self, f: F) -> FlatMap<Self, F>
  where
    F: Fn(Self::Item) -> Inner + Send + Sync + 'static,
    Inner: Publisher,
  {
    FlatMap::new(self, f)
  }

  /// Subscribe to the upstream, and serve its requests, on a worker of
  /// `scheduler`.
  fn subscribe_on<Sch: Scheduler + Clone>(self, scheduler: Sch) -> SubscribeOn<Self, Sch> {
    SubscribeOn::new(self, scheduler)
  }

  /// Deliver every signal from this point on from a worker of `scheduler`.
  fn publish_on<Sch: Scheduler + Clone>(self, scheduler: Sch) -> PublishOn<Self, Sch> {
    PublishOn::new(self, scheduler)
  }

  /// Emit one `Vec` with every item once the upstream completes.
  fn collect_vec(self) -> CollectVec<Self> { CollectVec::new(self) }

  /// Split into `rails` parallel rails, assigning items round-robin.
  fn parallel(self, rails: usize) -> ParallelSource<Self> { ParallelSource::new(self, rails) }

  /// Hot source that keeps every item for late subscribers.
  fn replay_all(self) -> ConnectableSource<Self::Item>
  where
    Self: 'static,
    Self::Item: Clone,
  {
    ConnectableSource::new(self, ReplayPolicy::Unbounded)
  }

  /// Hot source that keeps the last `count` items for late subscribers.
  fn replay(self, count: usize) -> ConnectableSource<Self::Item>
  where
    Self: 'static,
    Self::Item: Clone,
  {
    ConnectableSource::new(self, ReplayPolicy::MaxCount(count))
  }

  /// Hot source that keeps items younger than `max_age` for late
  /// subscribers.
  fn replay_for(self, max_age: Duration) -> ConnectableSource<Self::Item>
  where
    Self: 'static,
    Self::Item: Clone,
  {
    ConnectableSource::new(self, ReplayPolicy::MaxAge(max_age))
  }

  /// Subscribe with unbounded demand. Errors are logged.
  fn subscribe<N>(self, next: N) -> Disposable
  where
    N: FnMut(Self::Item) + Send + 'static,
  {
    let subscriber = LambdaSubscriber::<N, NoErrorHandler, NoCompleteHandler>::new(next, None, None);
    let disposable = subscriber.disposable();
    self.actual_subscribe(Box::new(subscriber));
    disposable
  }

  /// Subscribe with unbounded demand and handlers for every signal.
  fn subscribe_all<N, E, C>(self, next: N, error: E, complete: C) -> Disposable
  where
    N: FnMut(Self::Item) + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    let subscriber = LambdaSubscriber::new(next, Some(error), Some(complete));
    let disposable = subscriber.disposable();
    self.actual_subscribe(Box::new(subscriber));
    disposable
  }

  /// Subscribe a subscriber that drives its own demand through the
  /// subscription it receives in `on_subscribe`.
  fn subscribe_with<S>(self, subscriber: S)
  where
    S: Subscriber<Self::Item> + 'static,
  {
    self.actual_subscribe(Box::new(subscriber));
  }

  /// Async stream of the items, requesting one item per poll.
  fn into_stream(self) -> SubscriberStream<Self::Item> { SubscriberStream::new(&self) }

  /// Blocking iterator over the items. Blocks the calling thread while
  /// waiting for each item.
  fn blocking_iter(self) -> BlockingIter<Self::Item> { BlockingIter::new(self.into_stream()) }
}

impl<P: Publisher> PublisherExt for P {}
