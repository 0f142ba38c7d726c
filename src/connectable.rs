//! Hot sources that share one upstream subscription and replay a window of
//! history to late subscribers.
//!
//! A [`ConnectableSource`] registers subscribers in any state but only
//! subscribes to its upstream on [`ConnectableSource::connect`]. Every item
//! that arrives is appended to a [`ReplayPolicy`]-bounded buffer and handed to
//! each subscriber as its own demand allows. A subscriber that joins later
//! first drains the part of the buffer the policy still allows, then
//! continues with live items. Completion and errors are cached and replayed
//! to anyone joining after termination.
//!
//! ```rust
//! use rxflow::{prelude::*, test_subscriber::TestSubscriber};
//!
//! let source = publisher::just([1, 2, 3]).replay(2);
//! source.connect();
//!
//! let late = TestSubscriber::new();
//! source.clone().subscribe_with(late.clone());
//! assert_eq!(late.values(), vec![2, 3]);
//! assert!(late.is_completed());
//! ```
use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc, Mutex, Weak,
};

use crate::{
  publisher::Publisher,
  rc::lock,
  scheduler::{Clock, Duration, SystemClock},
  signal::Signal,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Demand, Disposable, Registry, Subscription, SubscriptionRef, Wip, UNBOUNDED},
  Error,
};

mod buffer;
use buffer::ReplayBuffer;

/// Which part of the history a late subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPolicy {
  /// Everything since the first connect.
  Unbounded,
  /// The last `n` items.
  MaxCount(usize),
  /// Items that arrived at most this long ago.
  MaxAge(Duration),
}

/// How much the source asks of its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamDemand {
  /// Request everything on connect.
  #[default]
  Unbounded,
  /// Request only up to the furthest item any subscriber has asked for.
  FollowSubscribers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Unconnected,
  Connected,
  Terminated,
}

struct State<Item> {
  phase: ConnectionState,
  buffer: ReplayBuffer<Item>,
  terminal: Option<Signal<Item>>,
  subscribers: Registry<Arc<ReplaySubscription<Item>>>,
  upstream: Option<SubscriptionRef>,
  /// Bumped by every connect so signals of a disconnected upstream are
  /// ignored.
  generation: u64,
  /// Sequence number up to which the current upstream was asked for items.
  requested_until: u64,
  clock: Arc<dyn Clock>,
  mode: UpstreamDemand,
}

impl<Item> State<Item> {
  fn is_current(&self, generation: u64) -> bool {
    self.generation == generation && self.phase == ConnectionState::Connected
  }

  /// Drop buffer entries that neither the policy nor any subscriber needs.
  fn trim(&mut self) {
    let window = self.buffer.window_start(self.clock.now());
    let keep_from = self.subscribers.iter().map(|s| s.cursor()).fold(window, u64::min);
    self.buffer.trim(keep_from);
  }
}

struct Inner<Item> {
  source: Arc<dyn Publisher<Item = Item>>,
  state: Mutex<State<Item>>,
}

/// A hot, replaying publisher. Clones share the same connection and buffer.
pub struct ConnectableSource<Item> {
  inner: Arc<Inner<Item>>,
}

impl<Item> Clone for ConnectableSource<Item> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<Item: Clone + Send + 'static> ConnectableSource<Item> {
  pub fn new<S>(source: S, policy: ReplayPolicy) -> Self
  where
    S: Publisher<Item = Item> + 'static,
  {
    let state = State {
      phase: ConnectionState::Unconnected,
      buffer: ReplayBuffer::new(policy),
      terminal: None,
      subscribers: Registry::default(),
      upstream: None,
      generation: 0,
      requested_until: 0,
      clock: Arc::new(SystemClock),
      mode: UpstreamDemand::default(),
    };
    Self { inner: Arc::new(Inner { source: Arc::new(source), state: Mutex::new(state) }) }
  }

  /// Time source used for [`ReplayPolicy::MaxAge`].
  pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
    lock(&self.inner.state).clock = clock;
    self
  }

  pub fn with_upstream_demand(self, mode: UpstreamDemand) -> Self {
    lock(&self.inner.state).mode = mode;
    self
  }

  pub fn state(&self) -> ConnectionState { lock(&self.inner.state).phase }

  /// Subscribe to the upstream unless already connected or terminated.
  ///
  /// Disposing the returned handle cancels the upstream and moves the
  /// source back to [`ConnectionState::Unconnected`]; subscribers and the
  /// buffer are kept for the next `connect`.
  pub fn connect(&self) -> Disposable {
    let (generation, fresh) = {
      let mut state = lock(&self.inner.state);
      if state.phase == ConnectionState::Unconnected {
        state.phase = ConnectionState::Connected;
        state.generation += 1;
        (state.generation, true)
      } else {
        (state.generation, false)
      }
    };
    if fresh {
      log::debug!("connecting replay source, generation {generation}");
      self
        .inner
        .source
        .actual_subscribe(Box::new(ReplayUpstream { inner: self.inner.clone(), generation }));
    }
    Disposable::new(Arc::new(Connection { inner: Arc::downgrade(&self.inner), generation }))
  }
}

impl<Item> Inner<Item> {
  fn remove(&self, id: usize) {
    let mut state = lock(&self.state);
    state.subscribers.remove(id);
    state.trim();
  }

  fn request_upstream(&self) {
    let (upstream, n) = {
      let mut state = lock(&self.state);
      if state.mode != UpstreamDemand::FollowSubscribers
        || state.phase != ConnectionState::Connected
      {
        return;
      }
      let Some(upstream) = state.upstream.clone() else { return };
      let target = state
        .subscribers
        .iter()
        .map(|s| s.cursor().saturating_add(s.demand.outstanding()))
        .max()
        .unwrap_or(0);
      if target <= state.requested_until {
        return;
      }
      let n = if target == UNBOUNDED { UNBOUNDED } else { target - state.requested_until };
      state.requested_until = target;
      (upstream, n)
    };
    upstream.request(n);
  }
}

enum Step<Item> {
  Next(Item),
  Skip,
  Terminal(Signal<Item>),
  Idle,
}

impl<Item: Clone> Inner<Item> {
  fn next_step(&self, subscription: &ReplaySubscription<Item>) -> Step<Item> {
    let mut state = lock(&self.state);
    let mut cursor = subscription.cursor();
    if cursor < subscription.live_from && state.buffer.expires() {
      // aged history is re-checked at delivery time
      let window = state.buffer.window_start(state.clock.now()).min(subscription.live_from);
      cursor = cursor.max(window);
      subscription.cursor.store(cursor, Ordering::Release);
    }
    if cursor < state.buffer.next_seq() {
      let Some(item) = state.buffer.get(cursor).cloned() else {
        subscription.cursor.store(cursor + 1, Ordering::Release);
        return Step::Skip;
      };
      if !subscription.demand.take_one() {
        return Step::Idle;
      }
      subscription.cursor.store(cursor + 1, Ordering::Release);
      if cursor == state.buffer.front_seq() {
        state.trim();
      }
      Step::Next(item)
    } else if let Some(terminal) = &state.terminal {
      Step::Terminal(terminal.clone())
    } else {
      Step::Idle
    }
  }
}

impl<Item: Clone + Send + 'static> Publisher for ConnectableSource<Item> {
  type Item = Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<Item>) {
    let subscription = {
      let mut state = lock(&self.inner.state);
      let id = state.subscribers.reserve_id();
      let now = state.clock.now();
      let subscription = Arc::new(ReplaySubscription {
        id,
        cursor: AtomicU64::new(state.buffer.window_start(now)),
        live_from: state.buffer.next_seq(),
        demand: Demand::default(),
        wip: Wip::entered(),
        subscriber: Mutex::new(None),
        inner: Arc::downgrade(&self.inner),
      });
      state.subscribers.insert(id, subscription.clone());
      subscription
    };
    subscriber.on_subscribe(subscription.clone());
    *lock(&subscription.subscriber) = Some(subscriber);
    subscription.wip.run(|| subscription.drain_pass());
  }
}

// ============================================================================
// Per-subscriber replay
// ============================================================================

struct ReplaySubscription<Item> {
  id: usize,
  /// Sequence number of the next item to deliver.
  cursor: AtomicU64,
  /// First sequence number that was live when this subscriber joined.
  live_from: u64,
  demand: Demand,
  wip: Wip,
  subscriber: Mutex<Option<BoxedSubscriber<Item>>>,
  inner: Weak<Inner<Item>>,
}

impl<Item> ReplaySubscription<Item> {
  #[inline]
  fn cursor(&self) -> u64 { self.cursor.load(Ordering::Acquire) }
}

impl<Item: Clone + Send + 'static> ReplaySubscription<Item> {
  fn drain(&self) { self.wip.drain(|| self.drain_pass()) }

  fn drain_pass(&self) {
    let Some(inner) = self.inner.upgrade() else {
      lock(&self.subscriber).take();
      return;
    };
    let _delivering = self.demand.deliver();
    let mut slot = lock(&self.subscriber);
    loop {
      let Some(subscriber) = slot.as_mut() else { return };
      if self.demand.is_cancelled() {
        slot.take();
        inner.remove(self.id);
        return;
      }
      match inner.next_step(self) {
        Step::Next(item) => subscriber.on_next(item),
        Step::Skip => {}
        Step::Terminal(signal) => {
          if let Some(mut subscriber) = slot.take() {
            signal.dispatch(&mut subscriber);
          }
          inner.remove(self.id);
          return;
        }
        Step::Idle => return,
      }
    }
  }
}

impl<Item: Clone + Send + 'static> Subscription for ReplaySubscription<Item> {
  fn request(&self, n: u64) {
    if n == 0 || self.demand.is_cancelled() {
      return;
    }
    self.demand.add(n);
    self.drain();
    if let Some(inner) = self.inner.upgrade() {
      inner.request_upstream();
    }
  }

  fn cancel(&self) {
    if self.demand.cancel() {
      self.drain();
    }
  }
}

// ============================================================================
// Upstream side
// ============================================================================

struct ReplayUpstream<Item> {
  inner: Arc<Inner<Item>>,
  generation: u64,
}

impl<Item: Clone + Send + 'static> ReplayUpstream<Item> {
  fn terminate(&self, signal: Signal<Item>) {
    let subscribers = {
      let mut state = lock(&self.inner.state);
      if !state.is_current(self.generation) {
        return;
      }
      state.phase = ConnectionState::Terminated;
      state.terminal = Some(signal);
      state.upstream = None;
      state.subscribers.snapshot()
    };
    log::debug!("replay source terminated, {} subscriber(s) notified", subscribers.len());
    subscribers.iter().for_each(|s| s.drain());
  }
}

impl<Item: Clone + Send + 'static> Subscriber<Item> for ReplayUpstream<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) {
    let mode = {
      let mut state = lock(&self.inner.state);
      if state.is_current(self.generation) {
        state.upstream = Some(subscription.clone());
        state.requested_until = state.buffer.next_seq();
        Some(state.mode)
      } else {
        None
      }
    };
    match mode {
      None => subscription.cancel(),
      Some(UpstreamDemand::Unbounded) => subscription.request(UNBOUNDED),
      Some(UpstreamDemand::FollowSubscribers) => self.inner.request_upstream(),
    }
  }

  fn on_next(&mut self, item: Item) {
    let subscribers = {
      let mut state = lock(&self.inner.state);
      if !state.is_current(self.generation) {
        return;
      }
      let now = state.clock.now();
      state.buffer.push(item, now);
      state.trim();
      state.subscribers.snapshot()
    };
    subscribers.iter().for_each(|s| s.drain());
  }

  fn on_error(&mut self, err: Error) { self.terminate(Signal::Error(err)) }

  fn on_complete(&mut self) { self.terminate(Signal::Complete) }
}

/// The handle returned by `connect`.
struct Connection<Item> {
  inner: Weak<Inner<Item>>,
  generation: u64,
}

impl<Item: Send + 'static> Subscription for Connection<Item> {
  fn request(&self, _n: u64) {}

  fn cancel(&self) {
    let Some(inner) = self.inner.upgrade() else { return };
    let upstream = {
      let mut state = lock(&inner.state);
      if !state.is_current(self.generation) {
        return;
      }
      state.phase = ConnectionState::Unconnected;
      state.upstream.take()
    };
    log::debug!("replay source disconnected, generation {}", self.generation);
    if let Some(upstream) = upstream {
      upstream.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, AtomicUsize};

  use super::*;
  use crate::{
    prelude::*, publisher::PublisherExt, scheduler::ManualClock, test_subscriber::TestSubscriber,
  };

  /// A source the test pushes items into by hand.
  #[derive(Clone, Default)]
  struct Hot {
    subscribers: Arc<Mutex<Vec<BoxedSubscriber<i32>>>>,
    subscriptions: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
  }

  struct HotSubscription(Arc<AtomicBool>);

  impl Subscription for HotSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
  }

  impl Publisher for Hot {
    type Item = i32;

    fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<i32>) {
      self.subscriptions.fetch_add(1, Ordering::SeqCst);
      subscriber.on_subscribe(Arc::new(HotSubscription(self.cancelled.clone())));
      self.subscribers.lock().unwrap().push(subscriber);
    }
  }

  impl Hot {
    fn emit(&self, v: i32) { self.subscribers.lock().unwrap().iter_mut().for_each(|s| s.on_next(v)); }

    fn complete(&self) { self.subscribers.lock().unwrap().iter_mut().for_each(|s| s.on_complete()); }

    fn subscriptions(&self) -> usize { self.subscriptions.load(Ordering::SeqCst) }
  }

  #[test]
  fn late_subscriber_gets_last_items_then_live() {
    let hot = Hot::default();
    let source = hot.clone().replay(2);
    let early = TestSubscriber::new();
    source.clone().subscribe_with(early.clone());

    source.connect();
    [10, 20, 30].into_iter().for_each(|v| hot.emit(v));
    let late = TestSubscriber::new();
    source.clone().subscribe_with(late.clone());
    assert_eq!(late.values(), vec![20, 30]);

    hot.emit(40);
    assert_eq!(early.values(), vec![10, 20, 30, 40]);
    assert_eq!(late.values(), vec![20, 30, 40]);
  }

  #[test]
  fn late_subscriber_keeps_history_until_it_requests() {
    let hot = Hot::default();
    let source = hot.clone().replay(2);
    source.connect();
    [10, 20, 30].into_iter().for_each(|v| hot.emit(v));

    let late = TestSubscriber::with_request(0);
    source.clone().subscribe_with(late.clone());
    hot.emit(40);
    hot.emit(50);
    assert!(late.values().is_empty());

    late.request(10);
    assert_eq!(late.values(), vec![20, 30, 40, 50]);
    assert_eq!(lock(&source.inner.state).buffer.len(), 2);
  }

  #[test]
  fn nothing_flows_before_connect() {
    let hot = Hot::default();
    let source = hot.clone().replay_all();
    let ts = TestSubscriber::new();
    source.clone().subscribe_with(ts.clone());

    assert!(ts.is_subscribed());
    assert_eq!(hot.subscriptions(), 0);
    assert_eq!(source.state(), ConnectionState::Unconnected);
  }

  #[test]
  fn connect_is_idempotent() {
    let hot = Hot::default();
    let source = hot.clone().replay_all();
    source.connect();
    source.clone().connect();
    assert_eq!(hot.subscriptions(), 1);
    assert_eq!(source.state(), ConnectionState::Connected);
  }

  #[test]
  fn max_age_skips_expired_history() {
    let clock = ManualClock::new();
    let hot = Hot::default();
    let source = hot.clone().replay_for(Duration::from_secs(2)).with_clock(Arc::new(clock.clone()));
    source.connect();

    hot.emit(1);
    clock.advance(Duration::from_secs(1));
    hot.emit(2);
    clock.advance(Duration::from_millis(1500));

    let ts = TestSubscriber::new();
    source.clone().subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![2]);
  }

  #[test]
  fn history_is_checked_again_when_delivered() {
    let clock = ManualClock::new();
    let hot = Hot::default();
    let source = hot.clone().replay_for(Duration::from_secs(2)).with_clock(Arc::new(clock.clone()));
    source.connect();
    hot.emit(1);
    clock.advance(Duration::from_secs(1));
    hot.emit(2);

    let ts = TestSubscriber::with_request(0);
    source.clone().subscribe_with(ts.clone());
    clock.advance(Duration::from_millis(1500));
    ts.request(2);
    assert_eq!(ts.values(), vec![2]);

    // live items are never dropped for age
    hot.emit(3);
    clock.advance(Duration::from_secs(10));
    hot.emit(4);
    assert_eq!(ts.values(), vec![2, 3]);
    ts.request(1);
    assert_eq!(ts.values(), vec![2, 3, 4]);
  }

  #[test]
  fn termination_is_replayed() {
    let hot = Hot::default();
    let source = hot.clone().replay(1);
    source.connect();
    hot.emit(1);
    hot.emit(2);
    hot.complete();
    assert_eq!(source.state(), ConnectionState::Terminated);

    let ts = TestSubscriber::new();
    source.clone().subscribe_with(ts.clone());
    assert_eq!(ts.values(), vec![2]);
    assert_eq!(ts.completions(), 1);

    // connecting a terminated source does nothing
    source.connect();
    assert_eq!(hot.subscriptions(), 1);
  }

  #[test]
  fn error_is_replayed() {
    let source = publisher::error::<i32>(Error::msg("boom")).replay_all();
    source.connect();
    let ts = TestSubscriber::new();
    source.clone().subscribe_with(ts.clone());
    assert_eq!(ts.errors().len(), 1);
    assert_eq!(ts.errors()[0].to_string(), "boom");
  }

  #[test]
  fn slow_subscriber_keeps_its_items() {
    let hot = Hot::default();
    let source = hot.clone().replay(1);
    let slow = TestSubscriber::with_request(1);
    source.clone().subscribe_with(slow.clone());
    source.connect();
    [1, 2, 3].into_iter().for_each(|v| hot.emit(v));
    assert_eq!(slow.values(), vec![1]);

    let late = TestSubscriber::new();
    source.clone().subscribe_with(late.clone());
    assert_eq!(late.values(), vec![3]);

    slow.request(5);
    assert_eq!(slow.values(), vec![1, 2, 3]);
    assert_eq!(lock(&source.inner.state).buffer.len(), 1);
  }

  #[test]
  fn cancelled_subscriber_leaves_registry() {
    let hot = Hot::default();
    let source = hot.clone().replay_all();
    let ts = TestSubscriber::new();
    source.clone().subscribe_with(ts.clone());
    source.connect();
    hot.emit(1);
    ts.cancel();
    hot.emit(2);

    assert_eq!(ts.values(), vec![1]);
    assert!(lock(&source.inner.state).subscribers.is_empty());
  }

  #[test]
  fn disconnect_cancels_upstream_and_allows_reconnect() {
    let hot = Hot::default();
    let source = hot.clone().replay_all();
    let ts = TestSubscriber::new();
    source.clone().subscribe_with(ts.clone());
    let connection = source.connect();
    hot.emit(1);

    connection.dispose();
    assert!(hot.cancelled.load(Ordering::SeqCst));
    assert_eq!(source.state(), ConnectionState::Unconnected);
    // the old upstream is ignored from now on
    hot.emit(2);
    assert_eq!(ts.values(), vec![1]);

    source.connect();
    assert_eq!(hot.subscriptions(), 2);
    assert_eq!(ts.values(), vec![1]);
  }

  #[test]
  fn following_subscribers_bounds_upstream_demand() {
    let emitted = Arc::new(AtomicUsize::new(0));
    let c_emitted = emitted.clone();
    let source = publisher::range(0, 100)
      .do_on_next(move |_| {
        c_emitted.fetch_add(1, Ordering::SeqCst);
      })
      .replay_all()
      .with_upstream_demand(UpstreamDemand::FollowSubscribers);
    let ts = TestSubscriber::with_request(3);
    source.clone().subscribe_with(ts.clone());
    source.connect();
    assert_eq!(emitted.load(Ordering::SeqCst), 3);

    ts.request(2);
    assert_eq!(emitted.load(Ordering::SeqCst), 5);
    assert_eq!(ts.values(), vec![0, 1, 2, 3, 4]);
  }
}
