use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};

use super::{Scheduler, Worker};

/// A fixed pool of workers leased round-robin.
#[derive(Clone)]
pub struct ParallelScheduler {
  name: Arc<str>,
  workers: Arc<Vec<Worker>>,
  next: Arc<AtomicUsize>,
  disposed: Arc<AtomicBool>,
  persistent: bool,
}

impl ParallelScheduler {
  /// Pool of `size` workers (at least one) named `{name}-{index}`.
  pub fn new(name: &str, size: usize) -> Self {
    let workers = (0..size.max(1)).map(|i| Worker::new(&format!("{name}-{i}"))).collect();
    Self {
      name: name.into(),
      workers: Arc::new(workers),
      next: Arc::default(),
      disposed: Arc::default(),
      persistent: false,
    }
  }

  pub(crate) fn persistent(mut self) -> Self {
    self.persistent = true;
    self
  }

  pub fn size(&self) -> usize { self.workers.len() }
}

impl Scheduler for ParallelScheduler {
  fn create_worker(&self) -> Worker {
    if self.is_disposed() {
      return Worker::rejected(&self.name);
    }
    let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
    self.workers[idx].clone()
  }

  fn dispose(&self) {
    if self.persistent {
      log::debug!("ignoring dispose of shared scheduler {}", self.name);
      return;
    }
    if !self.disposed.swap(true, Ordering::AcqRel) {
      self.workers.iter().for_each(Worker::dispose);
    }
  }

  fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}
