//! `merge_with`, and the arrival-order merge shared with `flat_map` and
//! `ParallelExt::sequential`.
use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use crate::{
  config,
  prelude::*,
  rc::lock,
  subscription::{Demand, Wip},
};

/// Subscribes to both sources at once and emits their items in arrival
/// order. Completes when both complete; the first error cancels the other.
pub struct MergeWith<A, B> {
  first: A,
  second: B,
}

impl<A: Clone, B: Clone> Clone for MergeWith<A, B> {
  fn clone(&self) -> Self { Self { first: self.first.clone(), second: self.second.clone() } }
}

impl<A, B> MergeWith<A, B> {
  pub(crate) fn new(first: A, second: B) -> Self { Self { first, second } }
}

impl<A, B> Publisher for MergeWith<A, B>
where
  A: Publisher,
  B: Publisher<Item = A::Item>,
{
  type Item = A::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<A::Item>) {
    MergeCore::subscribe(2, subscriber, |mut inputs| {
      let second = inputs.pop();
      let first = inputs.pop();
      if let (Some(first), Some(second)) = (first, second) {
        self.first.actual_subscribe(first);
        self.second.actual_subscribe(second);
      }
    });
  }
}

#[derive(Default)]
struct Input {
  upstream: Option<SubscriptionRef>,
  done: bool,
  consumed: usize,
}

struct MergeState<Item> {
  queue: VecDeque<(usize, Item)>,
  inputs: Vec<Input>,
  /// Inputs that have not terminated yet.
  active: usize,
  error: Option<Error>,
  finished: bool,
}

/// Merges several inputs into one downstream.
///
/// Each input prefetches `prefetch` items into a shared arrival-order queue
/// and is topped up once three quarters of that were delivered. Delivery to
/// the downstream happens in a [`Wip`] drain loop, so inputs emitting from
/// different threads never call the downstream concurrently.
pub(crate) struct MergeCore<Item> {
  demand: Demand,
  wip: Wip,
  state: Mutex<MergeState<Item>>,
  downstream: Mutex<Option<BoxedSubscriber<Item>>>,
  prefetch: u64,
  limit: usize,
}

impl<Item: Send + 'static> MergeCore<Item> {
  /// Hand `downstream` its subscription, then let `connect` subscribe one
  /// returned subscriber per input.
  pub(crate) fn subscribe(
    inputs: usize,
    downstream: BoxedSubscriber<Item>,
    connect: impl FnOnce(Vec<BoxedSubscriber<Item>>),
  ) {
    Self::subscribe_with(inputs, downstream, |core| {
      connect((0..inputs).map(|index| core.input(index)).collect())
    });
  }

  /// Like [`MergeCore::subscribe`], but `connect` gets the core itself and
  /// may open more inputs later with [`MergeCore::add_input`]. The first
  /// `inputs` slots must be driven through [`MergeCore::attach`] and
  /// [`MergeCore::finish`].
  pub(crate) fn subscribe_with(
    inputs: usize,
    mut downstream: BoxedSubscriber<Item>,
    connect: impl FnOnce(&Arc<Self>),
  ) {
    let config = config::global();
    let core = Arc::new(MergeCore {
      demand: Demand::default(),
      wip: Wip::entered(),
      state: Mutex::new(MergeState {
        queue: VecDeque::new(),
        inputs: (0..inputs).map(|_| Input::default()).collect(),
        active: inputs,
        error: None,
        finished: false,
      }),
      downstream: Mutex::new(None),
      prefetch: config.prefetch as u64,
      limit: config.replenish_limit(),
    });
    downstream.on_subscribe(Arc::new(MergeSubscription(core.clone())));
    *lock(&core.downstream) = Some(downstream);
    connect(&core);
    core.wip.run(|| core.drain());
  }

  fn input(self: &Arc<Self>, index: usize) -> BoxedSubscriber<Item> {
    Box::new(MergeInput { core: self.clone(), index })
  }

  /// Open one more input. `None` once the merge is over.
  pub(crate) fn add_input(self: &Arc<Self>) -> Option<BoxedSubscriber<Item>> {
    let index = {
      let mut state = lock(&self.state);
      if state.finished || self.demand.is_cancelled() {
        return None;
      }
      state.inputs.push(Input::default());
      state.active += 1;
      state.inputs.len() - 1
    };
    Some(self.input(index))
  }

  /// Store the upstream of slot `index` so cancelling the merge cancels it.
  /// Returns `false`, leaving the upstream untouched, if the merge is over.
  pub(crate) fn attach(&self, index: usize, upstream: &SubscriptionRef) -> bool {
    let mut state = lock(&self.state);
    let live = !state.finished && !self.demand.is_cancelled();
    if live {
      state.inputs[index].upstream = Some(upstream.clone());
    }
    live
  }

  /// Terminate slot `index`, with `err` if it failed.
  pub(crate) fn finish(&self, index: usize, err: Option<Error>) {
    self.update(|state| {
      let input = &mut state.inputs[index];
      if !input.done {
        input.done = true;
        input.upstream = None;
        state.active -= 1;
      }
      if let Some(err) = err {
        state.error.get_or_insert(err);
      }
    });
  }

  fn update(&self, f: impl FnOnce(&mut MergeState<Item>)) {
    {
      let mut state = lock(&self.state);
      if state.finished {
        return;
      }
      f(&mut state);
    }
    self.wip.drain(|| self.drain());
  }

  fn cancel_inputs(&self) {
    let upstreams: Vec<_> = {
      let mut state = lock(&self.state);
      state.queue.clear();
      state.inputs.iter_mut().filter_map(|i| i.upstream.take()).collect()
    };
    upstreams.iter().for_each(|u| u.cancel());
  }

  fn drain(&self) {
    let _delivering = self.demand.deliver();
    let mut slot = lock(&self.downstream);
    let Some(downstream) = slot.as_mut() else { return };
    loop {
      if self.demand.is_cancelled() {
        slot.take();
        drop(slot);
        self.cancel_inputs();
        return;
      }
      let mut state = lock(&self.state);
      if let Some(err) = state.error.take() {
        state.finished = true;
        drop(state);
        self.cancel_inputs();
        downstream.on_error(err);
        slot.take();
        return;
      }
      if state.queue.is_empty() {
        if state.active == 0 {
          state.finished = true;
          drop(state);
          downstream.on_complete();
          slot.take();
        }
        return;
      }
      if !self.demand.take_one() {
        return;
      }
      let Some((index, item)) = state.queue.pop_front() else { return };
      let input = &mut state.inputs[index];
      input.consumed += 1;
      let replenish = if input.consumed >= self.limit && !input.done {
        let n = input.consumed as u64;
        input.consumed = 0;
        input.upstream.clone().map(|u| (u, n))
      } else {
        None
      };
      drop(state);
      downstream.on_next(item);
      if let Some((upstream, n)) = replenish {
        upstream.request(n);
      }
    }
  }
}

struct MergeSubscription<Item>(Arc<MergeCore<Item>>);

impl<Item: Send + 'static> Subscription for MergeSubscription<Item> {
  fn request(&self, n: u64) {
    if n > 0 && !self.0.demand.is_cancelled() {
      self.0.demand.add(n);
      self.0.wip.drain(|| self.0.drain());
    }
  }

  fn cancel(&self) {
    if self.0.demand.cancel() {
      self.0.wip.drain(|| self.0.drain());
    }
  }
}

struct MergeInput<Item> {
  core: Arc<MergeCore<Item>>,
  index: usize,
}

impl<Item: Send + 'static> Subscriber<Item> for MergeInput<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    if self.core.attach(self.index, &subscription) {
      subscription.request(self.core.prefetch);
    } else {
      subscription.cancel();
    }
  }

  fn on_next(&mut self, item: Item) {
    let index = self.index;
    self.core.update(|state| state.queue.push_back((index, item)));
  }

  fn on_error(&mut self, err: Error) { self.core.finish(self.index, Some(err)) }

  fn on_complete(&mut self) { self.core.finish(self.index, None) }
}
