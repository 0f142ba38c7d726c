use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};

use futures::{executor::ThreadPool, future};

use super::{Scheduler, Task};
use crate::error::Error;

struct WorkerInner {
  name: String,
  pool: Option<ThreadPool>,
  disposed: AtomicBool,
  pending: AtomicUsize,
}

/// A sequential execution context backed by one dedicated thread.
///
/// Tasks run in submission order, never concurrently with each other.
/// Clones share the thread. After [`Worker::dispose`] new tasks are rejected
/// and queued ones are skipped.
#[derive(Clone)]
pub struct Worker {
  inner: Arc<WorkerInner>,
}

impl Worker {
  /// Start a worker whose thread is named `{name}-0`.
  ///
  /// If the thread cannot be started the worker is created rejected.
  pub fn new(name: &str) -> Self {
    let pool = ThreadPool::builder().pool_size(1).name_prefix(format!("{name}-")).create();
    let pool = match pool {
      Ok(pool) => Some(pool),
      Err(err) => {
        log::warn!("worker {name} failed to start: {err}");
        None
      }
    };
    log::debug!("worker {name} started");
    Self::build(name, pool)
  }

  /// A worker that rejects every task.
  pub fn rejected(name: &str) -> Self {
    let worker = Self::build(name, None);
    worker.inner.disposed.store(true, Ordering::Release);
    worker
  }

  fn build(name: &str, pool: Option<ThreadPool>) -> Self {
    Self {
      inner: Arc::new(WorkerInner {
        name: name.to_owned(),
        pool,
        disposed: AtomicBool::new(false),
        pending: AtomicUsize::new(0),
      }),
    }
  }

  pub fn name(&self) -> &str { &self.inner.name }

  /// Tasks submitted and not yet finished. A running periodic task counts
  /// as one.
  pub fn pending(&self) -> usize { self.inner.pending.load(Ordering::Acquire) }

  pub fn ptr_eq(&self, other: &Worker) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

  fn pool(&self) -> Result<&ThreadPool, Error> {
    match &self.inner.pool {
      Some(pool) if !self.inner.disposed.load(Ordering::Acquire) => Ok(pool),
      _ => {
        log::warn!("worker {} rejected a task", self.inner.name);
        Err(Error::SchedulerRejected(format!("worker {} is disposed", self.inner.name)))
      }
    }
  }

  /// Queue `task` behind every task submitted before it.
  pub fn schedule(&self, task: Task) -> Result<(), Error> {
    let pool = self.pool()?;
    let inner = self.inner.clone();
    inner.pending.fetch_add(1, Ordering::AcqRel);
    pool.spawn_ok(future::lazy(move |_| {
      if !inner.disposed.load(Ordering::Acquire) {
        task();
      }
      inner.pending.fetch_sub(1, Ordering::AcqRel);
    }));
    Ok(())
  }

  /// Run `task` every `period`, starting one period from now, until it
  /// returns `false` or the worker is disposed.
  ///
  /// Ticks interleave with the worker's other tasks and never overlap them.
  #[cfg(feature = "timer")]
  pub fn schedule_periodic<F>(&self, period: super::Duration, mut task: F) -> Result<(), Error>
  where
    F: FnMut() -> bool + Send + 'static,
  {
    use futures::StreamExt;

    let pool = self.pool()?;
    let inner = self.inner.clone();
    inner.pending.fetch_add(1, Ordering::AcqRel);
    pool.spawn_ok(async move {
      let mut ticks = futures_time::stream::interval(period.into());
      while ticks.next().await.is_some() {
        if inner.disposed.load(Ordering::Acquire) || !task() {
          break;
        }
      }
      inner.pending.fetch_sub(1, Ordering::AcqRel);
    });
    Ok(())
  }

  pub fn dispose(&self) {
    if !self.inner.disposed.swap(true, Ordering::AcqRel) {
      log::debug!("worker {} disposed", self.inner.name);
    }
  }

  pub fn is_disposed(&self) -> bool { self.inner.disposed.load(Ordering::Acquire) }
}

impl Scheduler for Worker {
  fn schedule(&self, task: Task) -> Result<(), Error> { Worker::schedule(self, task) }

  fn create_worker(&self) -> Worker { self.clone() }

  fn dispose(&self) { Worker::dispose(self) }

  fn is_disposed(&self) -> bool { Worker::is_disposed(self) }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::{mpsc, Mutex},
    thread,
    time::Duration,
  };

  use super::*;

  #[test]
  fn runs_in_submission_order_on_named_thread() {
    let worker = Worker::new("order");
    let seen = Arc::new(Mutex::new(vec![]));
    let (tx, rx) = mpsc::channel();
    for i in 0..100 {
      let seen = seen.clone();
      worker.schedule(Box::new(move || seen.lock().unwrap().push(i))).unwrap();
    }
    worker
      .schedule(Box::new(move || tx.send(thread::current().name().map(str::to_owned)).unwrap()))
      .unwrap();
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("order-0"));
    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
  }

  #[test]
  fn disposed_worker_rejects() {
    let worker = Worker::new("gone");
    worker.dispose();
    let err = worker.schedule(Box::new(|| {})).unwrap_err();
    assert!(matches!(err, Error::SchedulerRejected(_)));
    assert!(Worker::rejected("never").schedule(Box::new(|| {})).is_err());
  }

  #[cfg(feature = "timer")]
  #[test]
  fn periodic_stops_when_task_says_so() {
    let worker = Worker::new("tick");
    let (tx, rx) = mpsc::channel();
    let mut count = 0;
    worker
      .schedule_periodic(Duration::from_millis(1), move || {
        count += 1;
        tx.send(count).unwrap();
        count < 3
      })
      .unwrap();
    let got: Vec<_> = rx.iter().take(3).collect();
    assert_eq!(got, vec![1, 2, 3]);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
  }
}
