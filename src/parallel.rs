//! Parallel rails.
//!
//! [`PublisherExt::parallel`](crate::publisher::PublisherExt::parallel)
//! splits one sequence into a fixed number of rails. Each rail is an
//! independent subscription with its own demand; [`ParallelExt::run_on`]
//! gives every rail its own scheduler worker, rail operators run per rail,
//! and [`ParallelExt::sequential`] merges the rails back into one publisher.
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let mut squares = publisher::range(1, 8)
//!   .parallel(4)
//!   .run_on(schedulers::new_parallel("squares", 2))
//!   .map(|v| v * v)
//!   .sequential()
//!   .blocking_iter()
//!   .collect::<Result<Vec<_>, _>>()
//!   .unwrap();
//! squares.sort();
//! assert_eq!(squares, vec![1, 4, 9, 16, 25, 36, 49, 64]);
//! ```
use std::sync::Arc;

use crate::{
  error::Error,
  ops::handle::HandleSink,
  scheduler::Scheduler,
  subscriber::{BoxedSubscriber, LambdaSubscriber, NoCompleteHandler, NoErrorHandler},
  subscription::{Disposable, EmptySubscription},
};

mod rail;
mod run_on;
mod sequential;
mod split;

pub use rail::RailOp;
pub use run_on::RunOn;
pub use sequential::Sequential;
pub use split::ParallelSource;

/// A publisher of several rails at once.
pub trait ParallelPublisher: Send + Sync {
  type Item: Send + 'static;

  /// Number of rails.
  fn parallelism(&self) -> usize;

  /// Subscribe one subscriber per rail. `subscribers.len()` must equal
  /// [`parallelism`](ParallelPublisher::parallelism); otherwise every
  /// subscriber receives an error.
  fn subscribe_rails(&self, subscribers: Vec<BoxedSubscriber<Self::Item>>);
}

/// Fails every subscriber if their count does not match `parallelism`.
pub(crate) fn validate<Item>(
  parallelism: usize,
  subscribers: &mut Vec<BoxedSubscriber<Item>>,
) -> bool {
  if subscribers.len() == parallelism {
    return true;
  }
  let err = Error::msg(format!(
    "parallelism is {parallelism} but {} rail subscribers were given",
    subscribers.len()
  ));
  log::warn!("{err}");
  for mut subscriber in subscribers.drain(..) {
    subscriber.on_subscribe(EmptySubscription::shared());
    subscriber.on_error(err.clone());
  }
  false
}

pub trait ParallelExt: ParallelPublisher + Sized {
  /// Drive every rail from its own worker of `scheduler`.
  ///
  /// Rails and workers are independent: with more rails than the scheduler
  /// has threads, some threads serve several rails.
  fn run_on<Sch: Scheduler + Clone>(self, scheduler: Sch) -> RunOn<Self, Sch> {
    RunOn::new(self, scheduler)
  }

  /// Transform every item of every rail.
  fn map<Out, F>(self, f: F) -> RailOp<Self, Out>
  where
    F: Fn(Self::Item) -> Out + Send + Sync + 'static,
    Out: Send + 'static,
  {
    RailOp::new(self, Arc::new(move |v: Self::Item, sink: &mut HandleSink<Out>| sink.next(f(v))))
  }

  /// Drop the items failing `predicate` on every rail.
  fn filter<F>(self, predicate: F) -> RailOp<Self, Self::Item>
  where
    F: Fn(&Self::Item) -> bool + Send + Sync + 'static,
  {
    RailOp::new(
      self,
      Arc::new(move |v: Self::Item, sink: &mut HandleSink<Self::Item>| {
        if predicate(&v) {
          sink.next(v);
        }
      }),
    )
  }

  /// Peek at every item of every rail.
  fn do_on_next<F>(self, f: F) -> RailOp<Self, Self::Item>
  where
    F: Fn(&Self::Item) + Send + Sync + 'static,
  {
    RailOp::new(
      self,
      Arc::new(move |v: Self::Item, sink: &mut HandleSink<Self::Item>| {
        f(&v);
        sink.next(v);
      }),
    )
  }

  /// Merge the rails back into one publisher, in arrival order.
  fn sequential(self) -> Sequential<Self> { Sequential::new(self) }

  /// Consume every rail with `next`, called concurrently from the rails.
  /// Disposing the result cancels all rails.
  fn subscribe<N>(self, next: N) -> Disposable
  where
    N: Fn(Self::Item) + Send + Sync + 'static,
  {
    let next = Arc::new(next);
    let rails: Vec<_> = (0..self.parallelism())
      .map(|_| {
        let next = next.clone();
        LambdaSubscriber::<_, NoErrorHandler, NoCompleteHandler>::new(
          move |v: Self::Item| next(v),
          None,
          None,
        )
      })
      .collect();
    let disposable = Disposable::composite(rails.iter().map(|rail| rail.subscription()));
    self
      .subscribe_rails(rails.into_iter().map(|rail| Box::new(rail) as BoxedSubscriber<_>).collect());
    disposable
  }
}

impl<P: ParallelPublisher> ParallelExt for P {}
