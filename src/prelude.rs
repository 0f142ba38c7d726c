//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types and traits for easy access.

// Core protocol
pub use crate::publisher::{self, BoxedPublisher, Publisher, PublisherExt};
pub use crate::subscriber::{BoxedSubscriber, LambdaSubscriber, Subscriber};
pub use crate::subscription::{Disposable, Subscription, SubscriptionRef, UNBOUNDED};
// Errors
pub use crate::error::Error;
// Hot sources
pub use crate::connectable::{ConnectableSource, ConnectionState, ReplayPolicy, UpstreamDemand};
// Policies
pub use crate::ops::{
  repeat::RepeatWhen,
  retry::{RetryConfig, RetryWhen, Unlimited},
};
// Parallel rails
pub use crate::parallel::{ParallelExt, ParallelPublisher};
// Schedulers
pub use crate::scheduler::{schedulers, Duration, Instant, Scheduler, Worker};
