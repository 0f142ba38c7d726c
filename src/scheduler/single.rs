use super::{Scheduler, Worker};

/// One worker shared by every caller.
#[derive(Clone)]
pub struct SingleScheduler {
  worker: Worker,
  persistent: bool,
}

impl SingleScheduler {
  pub fn new(name: &str) -> Self { Self { worker: Worker::new(name), persistent: false } }

  /// Ignore `dispose`, for process-wide instances.
  pub(crate) fn persistent(mut self) -> Self {
    self.persistent = true;
    self
  }

  pub fn name(&self) -> &str { self.worker.name() }
}

impl Scheduler for SingleScheduler {
  fn create_worker(&self) -> Worker { self.worker.clone() }

  fn dispose(&self) {
    if self.persistent {
      log::debug!("ignoring dispose of shared scheduler {}", self.worker.name());
    } else {
      self.worker.dispose();
    }
  }

  fn is_disposed(&self) -> bool { self.worker.is_disposed() }
}
