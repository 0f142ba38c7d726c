//! # rxflow: backpressured reactive streams
//!
//! A small engine for reactive streams with explicit flow control. A
//! [`Publisher`] only delivers what its [`Subscriber`] asked for through the
//! [`Subscription`] it received, and operators keep that contract while they
//! map, filter, retry, or move work between threads.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let total = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0));
//! let c_total = total.clone();
//! publisher::range(0, 10)
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 2)
//!   .subscribe(move |v| {
//!     c_total.fetch_add(v, std::sync::atomic::Ordering::SeqCst);
//!   });
//! assert_eq!(total.load(std::sync::atomic::Ordering::SeqCst), 40);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | A cold, re-subscribable source; [`PublisherExt`] carries the operators |
//! | [`Subscriber`] | Consumes `on_next`, `on_error` and `on_complete` |
//! | [`Subscription`] | Grants demand with `request(n)` and stops the flow with `cancel()` |
//! | [`ConnectableSource`] | A hot source that replays a window of history |
//! | [`Scheduler`] | Hands out workers for `subscribe_on`, `publish_on` and `run_on` |
//! | [`ParallelPublisher`] | Several rails processed independently |
//!
//! ## Feature Flags
//!
//! - **`timer`** (default): the `interval` source and periodic worker tasks.
//!
//! [`Publisher`]: publisher::Publisher
//! [`PublisherExt`]: publisher::PublisherExt
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`ConnectableSource`]: connectable::ConnectableSource
//! [`Scheduler`]: scheduler::Scheduler
//! [`ParallelPublisher`]: parallel::ParallelPublisher

pub mod config;
pub mod connectable;
pub mod error;
pub mod ops;
pub mod parallel;
pub mod prelude;
pub mod publisher;
mod rc;
pub mod scheduler;
pub mod signal;
pub mod subscriber;
pub mod subscription;
pub mod test_subscriber;

pub use error::{Error, Result};

#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
