use std::{fmt::Debug, sync::Arc};

use crate::{prelude::*, subscription::UNBOUNDED};

/// Logs every signal passing through, plus requests and cancels travelling
/// up, at `info` level with the category as log target.
#[derive(Clone)]
pub struct Log<S> {
  source: S,
  category: Arc<str>,
}

impl<S> Log<S> {
  pub(crate) fn new(source: S, category: impl Into<String>) -> Self {
    Self { source, category: category.into().into() }
  }
}

impl<S> Publisher for Log<S>
where
  S: Publisher,
  S::Item: Debug,
{
  type Item = S::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<S::Item>) {
    let logger = LogSubscriber { category: self.category.clone(), downstream: subscriber };
    self.source.actual_subscribe(Box::new(logger));
  }
}

struct LogSubscriber<Item> {
  category: Arc<str>,
  downstream: BoxedSubscriber<Item>,
}

impl<Item: Debug + Send> Subscriber<Item> for LogSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    log::info!(target: &*self.category, "onSubscribe()");
    let logged = LogSubscription { category: self.category.clone(), upstream: subscription };
    self.downstream.on_subscribe(Arc::new(logged));
  }

  fn on_next(&mut self, item: Item) {
    log::info!(target: &*self.category, "onNext({item:?})");
    self.downstream.on_next(item);
  }

  fn on_error(&mut self, err: Error) {
    log::error!(target: &*self.category, "onError({err})");
    self.downstream.on_error(err);
  }

  fn on_complete(&mut self) {
    log::info!(target: &*self.category, "onComplete()");
    self.downstream.on_complete();
  }
}

struct LogSubscription {
  category: Arc<str>,
  upstream: SubscriptionRef,
}

impl Subscription for LogSubscription {
  fn request(&self, n: u64) {
    if n == UNBOUNDED {
      log::info!(target: &*self.category, "request(unbounded)");
    } else {
      log::info!(target: &*self.category, "request({n})");
    }
    self.upstream.request(n);
  }

  fn cancel(&self) {
    log::info!(target: &*self.category, "cancel()");
    self.upstream.cancel();
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn transparent_to_signals_and_demand() {
    let _ = env_logger::builder().is_test(true).try_init();
    let ts = TestSubscriber::with_request(2);
    publisher::range(0, 4).log("range").subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![0, 1]);
    ts.request(5);
    assert_eq!(ts.values(), vec![0, 1, 2, 3]);
    assert!(ts.is_completed());
  }
}
