//! Subscription handles and the demand bookkeeping shared by every operator.
//!
//! A [`Subscription`] is the upward channel of a subscription: the
//! subscriber grants demand with `request(n)` and stops the flow with
//! `cancel()`. The helpers in this module implement the protocol rules once:
//!
//! - [`Demand`] counts outstanding requests, saturating at [`UNBOUNDED`],
//!   and gates delivery so nothing reaches a subscriber once `cancel`
//!   returned.
//! - [`Wip`] serializes a drain loop so at most one thread emits to a
//!   subscriber at a time, and turns re-entrant calls into extra loop passes.
//! - [`ArbiterSubscription`] is a switchable upstream slot used wherever the
//!   upstream arrives later or changes over time.
use std::sync::{
  atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  Arc, Mutex, MutexGuard,
};

use smallvec::SmallVec;

use crate::rc::lock;

mod registry;
pub use registry::Registry;

/// Requesting this amount disables flow-control accounting.
pub const UNBOUNDED: u64 = u64::MAX;

/// The handle a publisher hands to its subscriber in `on_subscribe`.
pub trait Subscription: Send + Sync {
  /// Grant permission to deliver `n` more items. `0` is ignored.
  fn request(&self, n: u64);

  /// Stop delivery permanently. Safe to call concurrently and repeatedly.
  fn cancel(&self);
}

pub type SubscriptionRef = Arc<dyn Subscription>;

/// Saturating add that treats [`UNBOUNDED`] as absorbing.
#[inline]
pub(crate) fn add_cap(a: u64, b: u64) -> u64 { a.saturating_add(b) }

// ============================================================================
// Demand
// ============================================================================

/// Outstanding demand plus the cancelled flag of one subscription.
///
/// Drain loops hold [`Demand::deliver`] for every pass and check
/// [`Demand::is_cancelled`] before each signal. `cancel` called from another
/// thread waits for the running pass to let go, so once it returns the
/// subscriber sees no further signal. A cancel issued from inside the pass
/// (the subscriber cancelling in `on_next`) returns right away.
#[derive(Debug, Default)]
pub struct Demand {
  requested: AtomicU64,
  cancelled: AtomicBool,
  gate: Mutex<()>,
  /// Token of the thread running a pass, `0` when idle.
  owner: AtomicU64,
}

/// Held by a drain pass while it may signal the subscriber.
pub struct Delivering<'a> {
  owner: &'a AtomicU64,
  _gate: MutexGuard<'a, ()>,
}

impl Drop for Delivering<'_> {
  fn drop(&mut self) { self.owner.store(0, Ordering::Release); }
}

/// Small per-thread number, never `0` for a live thread.
fn thread_token() -> u64 {
  static NEXT: AtomicU64 = AtomicU64::new(1);
  thread_local!(static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed));
  TOKEN.try_with(|t| *t).unwrap_or(0)
}

impl Demand {
  /// Add `n` to the outstanding demand and return the previous value.
  pub fn add(&self, n: u64) -> u64 {
    if n == 0 {
      return self.requested.load(Ordering::Acquire);
    }
    self
      .requested
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| Some(add_cap(r, n)))
      .unwrap_or_else(|r| r)
  }

  /// Consume one unit of demand. Returns `false` if none is outstanding.
  pub fn take_one(&self) -> bool {
    self
      .requested
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| match r {
        UNBOUNDED => Some(r),
        0 => None,
        r => Some(r - 1),
      })
      .is_ok()
  }

  #[inline]
  pub fn outstanding(&self) -> u64 { self.requested.load(Ordering::Acquire) }

  #[inline]
  pub fn is_unbounded(&self) -> bool { self.outstanding() == UNBOUNDED }

  /// Mark cancelled and wait for a pass running on another thread to end.
  /// Returns `true` only for the call that flipped the flag.
  pub fn cancel(&self) -> bool {
    let first = !self.cancelled.swap(true, Ordering::AcqRel);
    if self.owner.load(Ordering::Acquire) != thread_token() {
      drop(lock(&self.gate));
    }
    first
  }

  /// Enter the delivery section for one drain pass.
  pub fn deliver(&self) -> Delivering<'_> {
    let gate = lock(&self.gate);
    self.owner.store(thread_token(), Ordering::Release);
    Delivering { owner: &self.owner, _gate: gate }
  }

  #[inline]
  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}

/// A bare `Demand` is the subscription of sources that only need the
/// counter, such as the terminal-only ones.
impl Subscription for Demand {
  fn request(&self, n: u64) {
    if !self.is_cancelled() {
      self.add(n);
    }
  }

  fn cancel(&self) { Demand::cancel(self); }
}

// ============================================================================
// Wip
// ============================================================================

/// Work-in-progress counter guarding a drain loop.
///
/// Whoever moves the counter away from zero owns the loop and keeps running
/// passes until every concurrent or re-entrant `enter` has been accounted for.
#[derive(Debug, Default)]
pub struct Wip(AtomicUsize);

impl Wip {
  /// A counter already owned by the creator. Use this when signals may
  /// arrive before the owner is ready to drain (e.g. inside `on_subscribe`);
  /// the owner must call [`Wip::run`] afterwards.
  pub fn entered() -> Self { Wip(AtomicUsize::new(1)) }

  /// Returns `true` if the caller became the owner of the drain loop.
  #[inline]
  pub fn enter(&self) -> bool { self.0.fetch_add(1, Ordering::AcqRel) == 0 }

  /// Run `pass` until no more work was signalled. Only the owner may call.
  pub fn run(&self, mut pass: impl FnMut()) {
    let mut missed = 1;
    loop {
      pass();
      missed = self.0.fetch_sub(missed, Ordering::AcqRel) - missed;
      if missed == 0 {
        break;
      }
    }
  }

  /// `enter` followed by `run` when ownership was acquired.
  #[inline]
  pub fn drain(&self, pass: impl FnMut()) {
    if self.enter() {
      self.run(pass);
    }
  }
}

// ============================================================================
// ArbiterSubscription
// ============================================================================

#[derive(Default)]
struct ArbiterState {
  current: Option<SubscriptionRef>,
  requested: u64,
  cancelled: bool,
}

/// A subscription whose upstream can be set later and replaced.
///
/// Demand requested before an upstream exists is kept and forwarded when one
/// is set. Each newly set upstream receives the demand that is still
/// outstanding, so a resubscription never asks for more than the downstream
/// granted. Once cancelled, every upstream set afterwards is cancelled
/// immediately.
#[derive(Default)]
pub struct ArbiterSubscription {
  state: Mutex<ArbiterState>,
}

impl ArbiterSubscription {
  pub fn new() -> Self { Self::default() }

  /// Arbiter that already holds `n` units of demand.
  pub fn with_request(n: u64) -> Self {
    let arbiter = Self::default();
    lock(&arbiter.state).requested = n;
    arbiter
  }

  /// Install `upstream` as the current subscription.
  pub fn set(&self, upstream: SubscriptionRef) {
    let requested = {
      let mut state = lock(&self.state);
      if state.cancelled {
        None
      } else {
        state.current = Some(upstream.clone());
        Some(state.requested)
      }
    };
    match requested {
      None => upstream.cancel(),
      Some(0) => {}
      Some(n) => upstream.request(n),
    }
  }

  /// Record that `n` items were delivered downstream.
  pub fn produced(&self, n: u64) {
    let mut state = lock(&self.state);
    if state.requested != UNBOUNDED {
      state.requested = state.requested.saturating_sub(n);
    }
  }

  pub fn is_cancelled(&self) -> bool { lock(&self.state).cancelled }

  /// Demand granted downstream and not yet used up.
  pub fn outstanding(&self) -> u64 { lock(&self.state).requested }
}

impl Subscription for ArbiterSubscription {
  fn request(&self, n: u64) {
    if n == 0 {
      return;
    }
    let current = {
      let mut state = lock(&self.state);
      if state.cancelled {
        return;
      }
      state.requested = add_cap(state.requested, n);
      state.current.clone()
    };
    if let Some(upstream) = current {
      upstream.request(n);
    }
  }

  fn cancel(&self) {
    let current = {
      let mut state = lock(&self.state);
      if state.cancelled {
        return;
      }
      state.cancelled = true;
      state.current.take()
    };
    if let Some(upstream) = current {
      upstream.cancel();
    }
  }
}

// ============================================================================
// EmptySubscription
// ============================================================================

/// Subscription of a publisher that has nothing to deliver on request.
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
  fn request(&self, _n: u64) {}

  fn cancel(&self) {}
}

impl EmptySubscription {
  pub fn shared() -> SubscriptionRef { Arc::new(EmptySubscription) }
}

// ============================================================================
// Disposable
// ============================================================================

/// Returned by terminal `subscribe*` calls and by `connect()`; disposing it
/// cancels the underlying subscription(s).
#[derive(Clone)]
pub struct Disposable {
  handles: SmallVec<[SubscriptionRef; 1]>,
  disposed: Arc<AtomicBool>,
}

impl Disposable {
  pub fn new(subscription: SubscriptionRef) -> Self {
    Self { handles: smallvec::smallvec![subscription], disposed: Arc::default() }
  }

  /// A disposable that cancels every handle in `subscriptions`.
  pub fn composite(subscriptions: impl IntoIterator<Item = SubscriptionRef>) -> Self {
    Self { handles: subscriptions.into_iter().collect(), disposed: Arc::default() }
  }

  pub fn dispose(&self) {
    if !self.disposed.swap(true, Ordering::AcqRel) {
      for handle in &self.handles {
        handle.cancel();
      }
    }
  }

  pub fn is_disposed(&self) -> bool { self.disposed.load(Ordering::Acquire) }
}
