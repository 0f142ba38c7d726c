use std::{marker::PhantomData, sync::Arc};

use crate::{prelude::*, subscription::Demand};

/// Completes immediately without emitting.
pub fn empty<Item>() -> Empty<Item> { Empty(PhantomData) }

/// Fails immediately with `err`.
pub fn error<Item>(err: Error) -> Throw<Item> { Throw { err, _item: PhantomData } }

/// Never emits and never terminates.
pub fn never<Item>() -> Never<Item> { Never(PhantomData) }

pub struct Empty<Item>(PhantomData<fn() -> Item>);

pub struct Throw<Item> {
  err: Error,
  _item: PhantomData<fn() -> Item>,
}

pub struct Never<Item>(PhantomData<fn() -> Item>);

impl<Item> Clone for Empty<Item> {
  fn clone(&self) -> Self { Empty(PhantomData) }
}

impl<Item> Clone for Throw<Item> {
  fn clone(&self) -> Self { Throw { err: self.err.clone(), _item: PhantomData } }
}

impl<Item> Clone for Never<Item> {
  fn clone(&self) -> Self { Never(PhantomData) }
}

/// Hand over a bare subscription, then send `terminal` unless it was
/// cancelled in the meantime.
fn start<Item>(
  subscriber: &mut BoxedSubscriber<Item>,
  terminal: impl FnOnce(&mut BoxedSubscriber<Item>),
) {
  let subscription = Arc::new(Demand::default());
  subscriber.on_subscribe(subscription.clone());
  let _delivering = subscription.deliver();
  if !subscription.is_cancelled() {
    terminal(subscriber);
  }
}

impl<Item: Send + 'static> Publisher for Empty<Item> {
  type Item = Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<Item>) {
    start(&mut subscriber, |s| s.on_complete());
  }
}

impl<Item: Send + 'static> Publisher for Throw<Item> {
  type Item = Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<Item>) {
    start(&mut subscriber, |s| s.on_error(self.err.clone()));
  }
}

impl<Item: Send + 'static> Publisher for Never<Item> {
  type Item = Item;

  fn actual_subscribe(&self, mut subscriber: BoxedSubscriber<Item>) { start(&mut subscriber, |_| {}); }
}
