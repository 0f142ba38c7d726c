use crate::{error::Error, subscriber::Subscriber};

/// One signal travelling downstream.
///
/// The connectable source caches its terminal signal in this form and
/// replays it to late subscribers.
#[derive(Debug, Clone)]
pub enum Signal<Item> {
  Next(Item),
  Error(Error),
  Complete,
}

impl<Item> Signal<Item> {
  #[inline]
  pub fn is_terminal(&self) -> bool { !matches!(self, Signal::Next(_)) }

  /// Deliver this signal to `subscriber`.
  pub fn dispatch<S>(self, subscriber: &mut S)
  where
    S: Subscriber<Item> + ?Sized,
  {
    match self {
      Signal::Next(v) => subscriber.on_next(v),
      Signal::Error(e) => subscriber.on_error(e),
      Signal::Complete => subscriber.on_complete(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_subscriber::TestSubscriber;

  #[test]
  fn dispatch_delivers_each_kind() {
    let mut ts = TestSubscriber::new();
    Signal::Next(1).dispatch(&mut ts);
    assert!(!Signal::Next(2).is_terminal());
    let done = Signal::<i32>::Complete;
    assert!(done.is_terminal());
    done.dispatch(&mut ts);
    assert_eq!(ts.values(), vec![1]);
    assert_eq!(ts.completions(), 1);
  }
}
