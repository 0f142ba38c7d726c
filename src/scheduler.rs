//! Where work runs.
//!
//! A [`Scheduler`] hands out [`Worker`]s: sequential execution contexts that
//! run tasks one at a time in submission order on a thread of their own.
//! Operators such as `subscribe_on`, `publish_on` and `run_on` lease a worker
//! per subscription (or per rail) and submit their signals to it as tasks.
//!
//! The constructors live in [`schedulers`]:
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let worker = schedulers::new_single("io").create_worker();
//! let (tx, rx) = std::sync::mpsc::channel();
//! worker
//!   .schedule(Box::new(move || tx.send(std::thread::current().name().map(str::to_owned)).unwrap()))
//!   .unwrap();
//! assert!(rx.recv().unwrap().unwrap().starts_with("io"));
//! ```
use std::sync::Arc;

pub use std::time::{Duration, Instant};

use crate::error::Error;

mod clock;
mod elastic;
mod parallel;
mod single;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use elastic::ElasticScheduler;
pub use parallel::ParallelScheduler;
pub use single::SingleScheduler;
pub use worker::Worker;

/// A unit of work submitted to a worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
  /// Run `task` on one of this scheduler's workers.
  ///
  /// Fails with [`Error::SchedulerRejected`] once the scheduler is disposed.
  fn schedule(&self, task: Task) -> Result<(), Error> { self.create_worker().schedule(task) }

  /// Lease a sequential execution context. A disposed scheduler returns a
  /// worker that rejects every task.
  fn create_worker(&self) -> Worker;

  /// Stop accepting tasks.
  fn dispose(&self);

  fn is_disposed(&self) -> bool;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
  #[inline]
  fn schedule(&self, task: Task) -> Result<(), Error> { (**self).schedule(task) }

  #[inline]
  fn create_worker(&self) -> Worker { (**self).create_worker() }

  #[inline]
  fn dispose(&self) { (**self).dispose() }

  #[inline]
  fn is_disposed(&self) -> bool { (**self).is_disposed() }
}

/// Scheduler constructors.
pub mod schedulers {
  use once_cell::sync::Lazy;

  use super::{ElasticScheduler, ParallelScheduler, SingleScheduler};
  use crate::config;

  static SINGLE: Lazy<SingleScheduler> =
    Lazy::new(|| SingleScheduler::new("rxflow-single").persistent());
  static PARALLEL: Lazy<ParallelScheduler> = Lazy::new(|| {
    ParallelScheduler::new("rxflow-parallel", config::global().parallelism).persistent()
  });
  static ELASTIC: Lazy<ElasticScheduler> = Lazy::new(|| {
    ElasticScheduler::new("rxflow-elastic", config::global().elastic_max).persistent()
  });

  /// The process-wide single worker. `dispose` on it is ignored.
  pub fn single() -> SingleScheduler { SINGLE.clone() }

  /// A fresh dedicated worker whose thread is named after `name`.
  pub fn new_single(name: &str) -> SingleScheduler { SingleScheduler::new(name) }

  /// The process-wide fixed pool sized by `RXFLOW_PARALLELISM`.
  ///
  /// Scheduling on it picks one worker per lease. It does not split one
  /// subscription's work across workers; use `parallel(n).run_on(..)` for
  /// that.
  pub fn parallel() -> ParallelScheduler { PARALLEL.clone() }

  /// A fresh fixed pool of `workers` workers.
  pub fn new_parallel(name: &str, workers: usize) -> ParallelScheduler {
    ParallelScheduler::new(name, workers)
  }

  /// The process-wide growing pool.
  pub fn elastic() -> ElasticScheduler { ELASTIC.clone() }

  /// A fresh growing pool capped at `RXFLOW_ELASTIC_MAX` workers.
  pub fn new_elastic(name: &str) -> ElasticScheduler {
    ElasticScheduler::new(name, config::global().elastic_max)
  }
}
