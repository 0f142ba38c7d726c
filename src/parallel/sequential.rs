use super::ParallelPublisher;
use crate::{ops::merge::MergeCore, prelude::*};

/// Merges the rails of a parallel publisher back into one sequence.
///
/// Items are emitted in arrival order on whichever thread delivers them;
/// no scheduler hop is added.
#[derive(Clone)]
pub struct Sequential<P> {
  source: P,
}

impl<P> Sequential<P> {
  pub(crate) fn new(source: P) -> Self { Self { source } }
}

impl<P: ParallelPublisher> Publisher for Sequential<P> {
  type Item = P::Item;

  fn actual_subscribe(&self, subscriber: BoxedSubscriber<P::Item>) {
    MergeCore::subscribe(self.source.parallelism(), subscriber, |rails| {
      self.source.subscribe_rails(rails)
    });
  }
}
