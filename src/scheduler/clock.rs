use std::sync::{Arc, Mutex};

use super::{Duration, Instant};
use crate::rc::lock;

/// Time source for age-based eviction.
pub trait Clock: Send + Sync {
  fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  #[inline]
  fn now(&self) -> Instant { Instant::now() }
}

/// Virtual time that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
  base: Instant,
  elapsed: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
  fn default() -> Self { Self::new() }
}

impl ManualClock {
  pub fn new() -> Self { Self { base: Instant::now(), elapsed: Arc::default() } }

  pub fn advance(&self, by: Duration) { *lock(&self.elapsed) += by; }

  pub fn elapsed(&self) -> Duration { *lock(&self.elapsed) }
}

impl Clock for ManualClock {
  fn now(&self) -> Instant { self.base + self.elapsed() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_clock_moves_only_on_advance() {
    let clock = ManualClock::new();
    let start = clock.now();
    assert_eq!(clock.now(), start);
    clock.clone().advance(Duration::from_millis(250));
    assert_eq!(clock.now() - start, Duration::from_millis(250));
  }
}
