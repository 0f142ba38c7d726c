//! The consumer side of the protocol.
//!
//! A [`Subscriber`] receives exactly one `on_subscribe`, then any number of
//! `on_next` bounded by the demand it granted, then at most one terminal
//! signal (`on_error` or `on_complete`).

use std::sync::Arc;

use crate::{
  error::Error,
  subscription::{ArbiterSubscription, Disposable, SubscriptionRef, UNBOUNDED},
};

/// Capability set of a stream consumer.
pub trait Subscriber<Item>: Send {
  /// Called once with the handle used to request items or cancel.
  fn on_subscribe(&mut self, subscription: SubscriptionRef);

  fn on_next(&mut self, item: Item);

  /// Terminal failure. No signal follows.
  fn on_error(&mut self, err: Error);

  /// Terminal success. No signal follows.
  fn on_complete(&mut self);
}

pub type BoxedSubscriber<Item> = Box<dyn Subscriber<Item>>;

impl<Item, S> Subscriber<Item> for Box<S>
where
  S: Subscriber<Item> + ?Sized,
{
  #[inline]
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { (**self).on_subscribe(subscription) }

  #[inline]
  fn on_next(&mut self, item: Item) { (**self).on_next(item) }

  #[inline]
  fn on_error(&mut self, err: Error) { (**self).on_error(err) }

  #[inline]
  fn on_complete(&mut self) { (**self).on_complete() }
}

// ============================================================================
// LambdaSubscriber
// ============================================================================

/// Terminal subscriber built from closures.
///
/// Requests its initial demand (unbounded by default) as soon as the
/// upstream arrives and stops invoking the closures once disposed. Without an
/// error handler, errors are reported through `log::error!`.
pub struct LambdaSubscriber<N, E, C> {
  next: N,
  error: Option<E>,
  complete: Option<C>,
  subscription: Arc<ArbiterSubscription>,
  done: bool,
}

impl<N, E, C> LambdaSubscriber<N, E, C> {
  pub fn new(next: N, error: Option<E>, complete: Option<C>) -> Self {
    Self::with_request(next, error, complete, UNBOUNDED)
  }

  /// Like [`LambdaSubscriber::new`] with a custom initial request.
  pub fn with_request(next: N, error: Option<E>, complete: Option<C>, request: u64) -> Self {
    Self {
      next,
      error,
      complete,
      subscription: Arc::new(ArbiterSubscription::with_request(request)),
      done: false,
    }
  }

  /// Handle that cancels this subscriber's subscription.
  pub fn disposable(&self) -> Disposable { Disposable::new(self.subscription()) }

  pub(crate) fn subscription(&self) -> SubscriptionRef { self.subscription.clone() }

  fn is_closed(&self) -> bool { self.done || self.subscription.is_cancelled() }
}

impl<Item, N, E, C> Subscriber<Item> for LambdaSubscriber<N, E, C>
where
  N: FnMut(Item) + Send,
  E: FnOnce(Error) + Send,
  C: FnOnce() + Send,
{
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.subscription.set(subscription); }

  fn on_next(&mut self, item: Item) {
    if !self.is_closed() {
      (self.next)(item);
    }
  }

  fn on_error(&mut self, err: Error) {
    if self.is_closed() {
      return;
    }
    self.done = true;
    match self.error.take() {
      Some(handler) => handler(err),
      None => log::error!("[{}] unhandled error in subscriber: {err}", err.as_label()),
    }
  }

  fn on_complete(&mut self) {
    if self.is_closed() {
      return;
    }
    self.done = true;
    if let Some(handler) = self.complete.take() {
      handler();
    }
  }
}

/// Type used for the missing handlers of `subscribe(next)`.
pub type NoErrorHandler = fn(Error);
/// Type used for the missing handlers of `subscribe(next)`.
pub type NoCompleteHandler = fn();

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
  };

  use super::*;
  use crate::subscription::Subscription;

  #[derive(Default)]
  struct Upstream {
    requested: AtomicU64,
  }

  impl Subscription for Upstream {
    fn request(&self, n: u64) { self.requested.fetch_add(n.min(1000), Ordering::SeqCst); }

    fn cancel(&self) {}
  }

  #[test]
  fn lambda_requests_initial_demand() {
    let upstream = Arc::new(Upstream::default());
    let mut s = LambdaSubscriber::<_, NoErrorHandler, NoCompleteHandler>::with_request(
      |_: i32| {},
      None,
      None,
      3,
    );
    s.on_subscribe(upstream.clone());
    assert_eq!(upstream.requested.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn nothing_after_dispose_or_terminal() {
    let seen = Arc::new(Mutex::new(vec![]));
    let completes = Arc::new(AtomicU64::new(0));
    let c_seen = seen.clone();
    let c_completes = completes.clone();
    let mut s = LambdaSubscriber::new(
      move |v: i32| c_seen.lock().unwrap().push(v),
      None::<NoErrorHandler>,
      Some(move || {
        c_completes.fetch_add(1, Ordering::SeqCst);
      }),
    );
    s.on_subscribe(Arc::new(Upstream::default()));
    s.on_next(1);
    s.on_complete();
    s.on_complete();
    s.on_next(2);
    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(completes.load(Ordering::SeqCst), 1);

    let c_seen = seen.clone();
    let mut s = LambdaSubscriber::<_, NoErrorHandler, NoCompleteHandler>::new(
      move |v: i32| c_seen.lock().unwrap().push(v),
      None,
      None,
    );
    let handle = s.disposable();
    handle.dispose();
    s.on_next(3);
    assert_eq!(*seen.lock().unwrap(), vec![1]);
  }
}
