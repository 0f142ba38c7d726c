use std::sync::{Arc, Mutex};

use crate::{
  prelude::*,
  rc::lock,
  subscription::{Demand, UNBOUNDED},
};

/// Requests everything from upstream and emits one `Vec` on completion,
/// once the downstream has requested at least one item.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let all = publisher::range(1, 3).collect_vec().blocking_iter().next();
/// assert_eq!(all.map(Result::unwrap), Some(vec![1, 2, 3]));
/// ```
#[derive(Clone)]
pub struct CollectVec<S> {
  source: S,
}

impl<S> CollectVec<S> {
  pub(crate) fn new(source: S) -> Self { Self { source } }
}

impl<S: Publisher> Publisher for CollectVec<S> {
  type Item = Vec<S::Item>;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<Vec<S::Item>>) {
    let shared = Arc::new(Collected {
      demand: Demand::default(),
      state: Mutex::new(CollectState { downstream: None, result: None, requested: false, upstream: None }),
    });
    self.source.actual_subscribe(Box::new(CollectSubscriber {
      shared,
      downstream: Some(subscriber),
      items: vec![],
    }));
  }
}

struct CollectState<Item> {
  downstream: Option<BoxedSubscriber<Vec<Item>>>,
  result: Option<Vec<Item>>,
  requested: bool,
  upstream: Option<SubscriptionRef>,
}

struct Collected<Item> {
  demand: Demand,
  state: Mutex<CollectState<Item>>,
}

impl<Item> Collected<Item> {
  /// Emit the result once it exists and was asked for.
  fn try_emit(&self) {
    let _delivering = self.demand.deliver();
    let ready = {
      let mut state = lock(&self.state);
      if self.demand.is_cancelled() || !state.requested || state.result.is_none() {
        None
      } else {
        state.downstream.take().zip(state.result.take())
      }
    };
    if let Some((mut downstream, result)) = ready {
      downstream.on_next(result);
      downstream.on_complete();
    }
  }

  fn fail(&self, err: Error) {
    let _delivering = self.demand.deliver();
    if self.demand.is_cancelled() {
      return;
    }
    let downstream = lock(&self.state).downstream.take();
    if let Some(mut downstream) = downstream {
      downstream.on_error(err);
    }
  }
}

impl<Item: Send> Subscription for Collected<Item> {
  fn request(&self, n: u64) {
    if n > 0 {
      lock(&self.state).requested = true;
      self.try_emit();
    }
  }

  fn cancel(&self) {
    self.demand.cancel();
    let upstream = {
      let mut state = lock(&self.state);
      state.downstream = None;
      state.upstream.take()
    };
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }
}

struct CollectSubscriber<Item> {
  shared: Arc<Collected<Item>>,
  downstream: Option<BoxedSubscriber<Vec<Item>>>,
  items: Vec<Item>,
}

impl<Item: Send + 'static> Subscriber<Item> for CollectSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    lock(&self.shared.state).upstream = Some(subscription.clone());
    if let Some(mut downstream) = self.downstream.take() {
      downstream.on_subscribe(self.shared.clone());
      let mut state = lock(&self.shared.state);
      if self.shared.demand.is_cancelled() {
        return;
      }
      state.downstream = Some(downstream);
    }
    subscription.request(UNBOUNDED);
  }

  fn on_next(&mut self, item: Item) { self.items.push(item); }

  fn on_error(&mut self, err: Error) { self.shared.fail(err) }

  fn on_complete(&mut self) {
    lock(&self.shared.state).result = Some(std::mem::take(&mut self.items));
    self.shared.try_emit();
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, test_subscriber::TestSubscriber};

  #[test]
  fn waits_for_demand() {
    let ts = TestSubscriber::with_request(0);
    publisher::just(["a", "b"]).collect_vec().subscribe_with(ts.clone());
    assert!(ts.values().is_empty());
    ts.request(1);
    assert_eq!(ts.values(), vec![vec!["a", "b"]]);
    assert!(ts.is_completed());
  }

  #[test]
  fn empty_source_gives_empty_vec() {
    let ts = TestSubscriber::new();
    publisher::empty::<i32>().collect_vec().subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![Vec::<i32>::new()]);
  }

  #[test]
  fn error_passes_through() {
    let ts = TestSubscriber::new();
    publisher::of(1).concat_with(publisher::error(Error::msg("x"))).collect_vec().subscribe_with(ts.clone());
    assert!(ts.values().is_empty());
    assert_eq!(ts.errors().len(), 1);
  }
}
