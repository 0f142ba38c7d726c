use std::sync::{Arc, Mutex};

use crate::{prelude::*, rc::lock, scheduler::Worker, subscription::ArbiterSubscription};

/// Subscribes to the upstream on a worker of the scheduler, wherever the
/// operator sits in the chain.
///
/// The downstream gets its subscription on the calling thread. Its requests
/// are forwarded from the same worker, so a source that emits from inside
/// `request` keeps emitting there.
#[derive(Clone)]
pub struct SubscribeOn<S, Sch> {
  source: Arc<S>,
  scheduler: Sch,
}

impl<S, Sch> SubscribeOn<S, Sch> {
  pub(crate) fn new(source: S, scheduler: Sch) -> Self {
    Self { source: Arc::new(source), scheduler }
  }
}

impl<S, Sch> Publisher for SubscribeOn<S, Sch>
where
  S: Publisher + 'static,
  Sch: Scheduler + Clone,
{
  type Item = S::Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<S::Item>) {
    let worker = self.scheduler.create_worker();
    let arbiter = Arc::new(ArbiterSubscription::new());
    subscriber.on_subscribe(Arc::new(SubscribeOnSubscription {
      arbiter: arbiter.clone(),
      worker: worker.clone(),
    }));

    let slot = Arc::new(Mutex::new(Some(subscriber)));
    let task = {
      let slot = slot.clone();
      let source = self.source.clone();
      move || {
        if let Some(downstream) = lock(&slot).take() {
          source.actual_subscribe(Box::new(SubscribeOnSubscriber { downstream, arbiter }));
        }
      }
    };
    if let Err(err) = worker.schedule(Box::new(task)) {
      if let Some(mut downstream) = lock(&slot).take() {
        downstream.on_error(err);
      }
    }
  }
}

struct SubscribeOnSubscription {
  arbiter: Arc<ArbiterSubscription>,
  worker: Worker,
}

impl Subscription for SubscribeOnSubscription {
  fn request(&self, n: u64) {
    if n == 0 {
      return;
    }
    let arbiter = self.arbiter.clone();
    if let Err(err) = self.worker.schedule(Box::new(move || arbiter.request(n))) {
      log::warn!("dropping request({n}): {err}");
    }
  }

  fn cancel(&self) { self.arbiter.cancel(); }
}

struct SubscribeOnSubscriber<Item> {
  downstream: BoxedSubscriber<Item>,
  arbiter: Arc<ArbiterSubscription>,
}

impl<Item: Send> Subscriber<Item> for SubscribeOnSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.arbiter.set(subscription); }

  fn on_next(&mut self, item: Item) { self.downstream.on_next(item) }

  fn on_error(&mut self, err: Error) { self.downstream.on_error(err) }

  fn on_complete(&mut self) { self.downstream.on_complete() }
}
