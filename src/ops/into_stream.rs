//! Bridges into `futures` streams and blocking iterators.
//!
//! The stream requests one item when created and one more each time an item
//! is taken out, so an unpolled stream holds back its source. Dropping it
//! cancels the subscription.
//!
//! ```rust
//! use futures::StreamExt;
//! use rxflow::prelude::*;
//!
//! # futures::executor::block_on(async {
//! let mut stream = publisher::of(1).into_stream();
//! assert_eq!(stream.next().await.map(Result::unwrap), Some(1));
//! assert!(stream.next().await.is_none());
//! # });
//! ```
use std::{
  collections::VecDeque,
  pin::Pin,
  sync::{Arc, Mutex},
  task::{Context, Poll, Waker},
};

use futures::{
  executor::{block_on_stream, BlockingStream},
  Stream,
};

use crate::{prelude::*, rc::lock, subscription::ArbiterSubscription};

struct StreamState<Item> {
  queue: VecDeque<Result<Item, Error>>,
  waker: Option<Waker>,
  is_closed: bool,
}

impl<Item> StreamState<Item> {
  fn push(&mut self, value: Option<Result<Item, Error>>) {
    match value {
      Some(v) => self.queue.push_back(v),
      None => self.is_closed = true,
    }
    if let Some(waker) = self.waker.take() {
      waker.wake();
    }
  }
}

/// A `Stream` of `Ok(item)` values, ending with one `Err` if the sequence
/// fails.
pub struct SubscriberStream<Item> {
  state: Arc<Mutex<StreamState<Item>>>,
  subscription: Arc<ArbiterSubscription>,
}

impl<Item: Send + 'static> SubscriberStream<Item> {
  pub(crate) fn new<P>(publisher: &P) -> Self
  where
    P: Publisher<Item = Item> + ?Sized,
  {
    let state = Arc::new(Mutex::new(StreamState { queue: VecDeque::new(), waker: None, is_closed: false }));
    let subscription = Arc::new(ArbiterSubscription::with_request(1));
    publisher.actual_subscribe(Box::new(StreamSubscriber {
      state: state.clone(),
      subscription: subscription.clone(),
    }));
    Self { state, subscription }
  }
}

impl<Item> Stream for SubscriberStream<Item> {
  type Item = Result<Item, Error>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    let mut state = lock(&this.state);
    match state.queue.pop_front() {
      Some(v) => {
        drop(state);
        if v.is_ok() {
          this.subscription.produced(1);
          this.subscription.request(1);
        }
        Poll::Ready(Some(v))
      }
      None if state.is_closed => Poll::Ready(None),
      None => {
        state.waker = Some(cx.waker().clone());
        Poll::Pending
      }
    }
  }
}

impl<Item> Drop for SubscriberStream<Item> {
  fn drop(&mut self) { self.subscription.cancel(); }
}

struct StreamSubscriber<Item> {
  state: Arc<Mutex<StreamState<Item>>>,
  subscription: Arc<ArbiterSubscription>,
}

impl<Item: Send> Subscriber<Item> for StreamSubscriber<Item> {
  fn on_subscribe(&mut self, subscription: SubscriptionRef) { self.subscription.set(subscription); }

  fn on_next(&mut self, item: Item) { lock(&self.state).push(Some(Ok(item))); }

  fn on_error(&mut self, err: Error) {
    let mut state = lock(&self.state);
    state.push(Some(Err(err)));
    state.push(None);
  }

  fn on_complete(&mut self) { lock(&self.state).push(None); }
}

/// Iterator that blocks the calling thread until the next signal arrives.
pub struct BlockingIter<Item>(BlockingStream<SubscriberStream<Item>>);

impl<Item> BlockingIter<Item> {
  pub(crate) fn new(stream: SubscriberStream<Item>) -> Self { Self(block_on_stream(stream)) }
}

impl<Item> Iterator for BlockingIter<Item> {
  type Item = Result<Item, Error>;

  fn next(&mut self) -> Option<Self::Item> { self.0.next() }
}
