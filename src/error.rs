//! Error values carried by `Error` signals.
//!
//! Every failure that crosses a subscription boundary is an [`Error`]. The
//! type is `Clone` so a connectable source can cache a terminal error and
//! replay it to late subscribers.

use std::{error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error taxonomy of the engine.
///
/// A signal that arrives after its subscription was cancelled is silently
/// dropped and therefore has no variant here.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum Error {
  /// A failure produced by a source or an operator body.
  #[error("{0}")]
  Upstream(Arc<dyn StdError + Send + Sync>),

  /// An operator body panicked while handling a signal.
  #[error("operator panicked: {0}")]
  Panicked(String),

  /// A limited retry policy ran out of attempts.
  #[error("retries exhausted after {attempts} attempts: {source}")]
  RetryExhausted {
    /// Number of subscriptions made, the initial one included.
    attempts: usize,
    /// The error of the last attempt.
    source: Box<Error>,
  },

  /// A scheduler or worker refused the task because it is disposed or could
  /// not be started.
  #[error("scheduler rejected task: {0}")]
  SchedulerRejected(String),

  /// A time-driven source had to emit while its subscriber had no demand.
  #[error("could not emit {0} due to lack of requests")]
  Overflow(String),
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl StdError for Message {}

impl Error {
  /// Wrap any error value as an upstream failure.
  pub fn upstream<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Error::Upstream(Arc::new(err))
  }

  /// An upstream failure that only carries a message.
  pub fn msg(message: impl Into<String>) -> Self { Error::Upstream(Arc::new(Message(message.into()))) }

  /// Returns the wrapped upstream error if it is of type `E`.
  ///
  /// Looks through `RetryExhausted` to the last attempt's error.
  pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
    match self {
      Error::Upstream(inner) => inner.downcast_ref::<E>(),
      Error::RetryExhausted { source, .. } => source.downcast_ref::<E>(),
      _ => None,
    }
  }

  /// The error of the failed attempt itself, unwrapping `RetryExhausted`.
  pub fn last_failure(&self) -> &Error {
    match self {
      Error::RetryExhausted { source, .. } => source.last_failure(),
      other => other,
    }
  }

  /// `true` if the wrapped upstream error is of type `E`.
  pub fn is<E: StdError + 'static>(&self) -> bool { self.downcast_ref::<E>().is_some() }

  /// Short stable label for logs.
  pub fn as_label(&self) -> &'static str {
    match self {
      Error::Upstream(_) => "upstream_failure",
      Error::Panicked(_) => "operator_panicked",
      Error::RetryExhausted { .. } => "retry_exhausted",
      Error::SchedulerRejected(_) => "scheduler_rejected",
      Error::Overflow(_) => "overflow",
    }
  }

  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
    let text = if let Some(s) = payload.downcast_ref::<&str>() {
      (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_owned()
    };
    Error::Panicked(text)
  }
}
