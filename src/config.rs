//! Process-wide tuning knobs.
//!
//! Read once from the environment on first use:
//!
//! | variable              | default                       |
//! |-----------------------|-------------------------------|
//! | `RXFLOW_PARALLELISM`  | available hardware threads    |
//! | `RXFLOW_PREFETCH`     | 256                           |
//! | `RXFLOW_ELASTIC_MAX`  | 64                            |
use std::{env, num::NonZeroUsize, thread};

use once_cell::sync::Lazy;

pub const DEFAULT_PREFETCH: usize = 256;
pub const DEFAULT_ELASTIC_MAX: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Worker count of the shared parallel scheduler.
  pub parallelism: usize,
  /// Items requested ahead by queueing operators (`publish_on`, merges,
  /// rail splitting).
  pub prefetch: usize,
  /// Upper bound on the workers an elastic scheduler creates.
  pub elastic_max: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      parallelism: thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1),
      prefetch: DEFAULT_PREFETCH,
      elastic_max: DEFAULT_ELASTIC_MAX,
    }
  }
}

impl Config {
  /// Defaults overridden by any valid `RXFLOW_*` variable.
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      parallelism: positive_var("RXFLOW_PARALLELISM", defaults.parallelism),
      prefetch: positive_var("RXFLOW_PREFETCH", defaults.prefetch),
      elastic_max: positive_var("RXFLOW_ELASTIC_MAX", defaults.elastic_max),
    }
  }

  /// Request size used to top up a prefetch queue: three quarters of
  /// `prefetch`, at least one.
  pub fn replenish_limit(&self) -> usize { (self.prefetch - (self.prefetch >> 2)).max(1) }
}

fn positive_var(key: &str, default: usize) -> usize {
  match env::var(key) {
    Ok(raw) => parse_positive(&raw).unwrap_or_else(|| {
      log::warn!("ignoring {key}={raw:?}: expected a positive integer, using {default}");
      default
    }),
    Err(_) => default,
  }
}

fn parse_positive(raw: &str) -> Option<usize> { raw.trim().parse().ok().filter(|v| *v > 0) }

static GLOBAL: Lazy<Config> = Lazy::new(Config::from_env);

/// The configuration used by the shared schedulers and queueing operators.
pub fn global() -> &'static Config { &GLOBAL }
