use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use super::{Scheduler, Worker};
use crate::rc::lock;

/// A pool that grows on demand.
///
/// A lease reuses an idle worker when there is one and otherwise starts a
/// new worker, up to `max`. At the cap the least busy worker is shared.
#[derive(Clone)]
pub struct ElasticScheduler {
  name: Arc<str>,
  workers: Arc<Mutex<Vec<Worker>>>,
  max: usize,
  disposed: Arc<AtomicBool>,
  persistent: bool,
}

impl ElasticScheduler {
  pub fn new(name: &str, max: usize) -> Self {
    Self {
      name: name.into(),
      workers: Arc::default(),
      max: max.max(1),
      disposed: Arc::default(),
      persistent: false,
    }
  }

  pub(crate) fn persistent(mut self) -> Self {
    self.persistent = true;
    self
  }

  /// Workers started so far.
  pub fn size(&self) -> usize { lock(&self.workers).len() }
}

impl Scheduler for ElasticScheduler {
  fn create_worker(&self) -> Worker {
    if self.is_disposed() {
      return Worker::rejected(&self.name);
    }
    let mut workers = lock(&self.workers);
    if let Some(idle) = workers.iter().find(|w| w.pending() == 0) {
      return idle.clone();
    }
    if workers.len() < self.max {
      let worker = Worker::new(&format!("{}-{}", self.name, workers.len()));
      workers.push(worker.clone());
      return worker;
    }
    match workers.iter().min_by_key(|w| w.pending()) {
      Some(w) => w.clone(),
      None => Worker::rejected(&self.name),
    }
  }

  fn dispose(&self) {
    if self.persistent {
      log::debug!("ignoring dispose of shared scheduler {}", self.name);
      return;
    }
    if !self.disposed.swap(true, Ordering::AcqRel) {
      lock(&self.workers).iter().for_each(Worker::dispose);
    }
  }

  fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
  use std::{sync::mpsc, time::Duration};

  use super::*;

  #[test]
  fn grows_while_workers_are_busy() {
    let elastic = ElasticScheduler::new("grow", 4);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let busy = elastic.create_worker();
    busy.schedule(Box::new(move || release_rx.recv_timeout(Duration::from_secs(5)).unwrap_or(())))
      .unwrap();
    let second = elastic.create_worker();
    assert!(!second.ptr_eq(&busy));
    assert_eq!(elastic.size(), 2);
    release_tx.send(()).unwrap();
  }

  #[test]
  fn reuses_idle_worker() {
    let elastic = ElasticScheduler::new("reuse", 4);
    let first = elastic.create_worker();
    let again = elastic.create_worker();
    assert!(first.ptr_eq(&again));
    assert_eq!(elastic.size(), 1);
  }

  #[test]
  fn capped_pool_shares_workers() {
    let elastic = ElasticScheduler::new("cap", 1);
    let first = elastic.create_worker();
    first.schedule(Box::new(|| std::thread::sleep(Duration::from_millis(20)))).unwrap();
    assert!(elastic.create_worker().ptr_eq(&first));
  }
}
