use super::ParallelPublisher;
use crate::{ops::publish_on::publish_on_subscriber, prelude::*};

/// Moves every rail onto its own worker of `scheduler`.
#[derive(Clone)]
pub struct RunOn<P, Sch> {
  source: P,
  scheduler: Sch,
}

impl<P, Sch> RunOn<P, Sch> {
  pub(crate) fn new(source: P, scheduler: Sch) -> Self { Self { source, scheduler } }
}

impl<P, Sch> ParallelPublisher for RunOn<P, Sch>
where
  P: ParallelPublisher,
  Sch: Scheduler + Clone,
{
  type Item = P::Item;

  fn parallelism(&self) -> usize { self.source.parallelism() }

  fn subscribe_rails(&self, subscribers: Vec<BoxedSubscriber<P::Item>>) {
    let rails = subscribers
      .into_iter()
      .map(|rail| publish_on_subscriber(rail, self.scheduler.create_worker()))
      .collect();
    self.source.subscribe_rails(rails);
  }
}
