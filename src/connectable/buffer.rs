use std::collections::VecDeque;

use super::ReplayPolicy;
use crate::scheduler::Instant;

struct Entry<Item> {
  seq: u64,
  at: Instant,
  item: Item,
}

/// Items received from upstream, addressed by a sequence number that keeps
/// counting across evictions.
///
/// The policy only decides which entries a new subscriber may still see
/// ([`ReplayBuffer::window_start`]). Entries are removed by
/// [`ReplayBuffer::trim`], which the owner calls with the oldest sequence
/// number any subscriber still needs.
pub(crate) struct ReplayBuffer<Item> {
  policy: ReplayPolicy,
  entries: VecDeque<Entry<Item>>,
  next_seq: u64,
}

impl<Item> ReplayBuffer<Item> {
  pub(crate) fn new(policy: ReplayPolicy) -> Self {
    Self { policy, entries: VecDeque::new(), next_seq: 0 }
  }

  pub(crate) fn push(&mut self, item: Item, now: Instant) {
    self.entries.push_back(Entry { seq: self.next_seq, at: now, item });
    self.next_seq += 1;
  }

  /// Sequence number the next pushed item will get.
  #[inline]
  pub(crate) fn next_seq(&self) -> u64 { self.next_seq }

  pub(crate) fn front_seq(&self) -> u64 { self.entries.front().map_or(self.next_seq, |e| e.seq) }

  /// Oldest sequence number the policy still allows to replay at `now`.
  pub(crate) fn window_start(&self, now: Instant) -> u64 {
    match self.policy {
      ReplayPolicy::Unbounded => self.front_seq(),
      ReplayPolicy::MaxCount(n) => self.front_seq().max(self.next_seq.saturating_sub(n as u64)),
      ReplayPolicy::MaxAge(max_age) => self
        .entries
        .iter()
        .find(|e| now.saturating_duration_since(e.at) <= max_age)
        .map_or(self.next_seq, |e| e.seq),
    }
  }

  /// Whether the window moves on its own as time passes.
  pub(crate) fn expires(&self) -> bool { matches!(self.policy, ReplayPolicy::MaxAge(_)) }

  pub(crate) fn get(&self, seq: u64) -> Option<&Item> {
    let offset = seq.checked_sub(self.front_seq())?;
    self.entries.get(usize::try_from(offset).ok()?).map(|e| &e.item)
  }

  /// Drop every entry older than `keep_from`.
  pub(crate) fn trim(&mut self, keep_from: u64) {
    while self.entries.front().map_or(false, |e| e.seq < keep_from) {
      self.entries.pop_front();
    }
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize { self.entries.len() }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  fn filled(policy: ReplayPolicy, items: &[i32], now: Instant) -> ReplayBuffer<i32> {
    let mut buffer = ReplayBuffer::new(policy);
    items.iter().for_each(|v| buffer.push(*v, now));
    buffer
  }

  #[test]
  fn max_count_window() {
    let now = Instant::now();
    let buffer = filled(ReplayPolicy::MaxCount(2), &[10, 20, 30], now);
    assert_eq!(buffer.window_start(now), 1);
    assert_eq!(buffer.get(1), Some(&20));
    assert_eq!(buffer.get(3), None);
  }

  #[test]
  fn max_count_larger_than_history() {
    let now = Instant::now();
    let buffer = filled(ReplayPolicy::MaxCount(10), &[1, 2], now);
    assert_eq!(buffer.window_start(now), 0);
  }

  #[test]
  fn max_age_window_moves_with_time() {
    let start = Instant::now();
    let mut buffer = ReplayBuffer::new(ReplayPolicy::MaxAge(Duration::from_secs(2)));
    buffer.push(1, start);
    buffer.push(2, start + Duration::from_secs(1));
    assert_eq!(buffer.window_start(start + Duration::from_secs(2)), 0);
    assert_eq!(buffer.window_start(start + Duration::from_millis(2500)), 1);
    assert_eq!(buffer.window_start(start + Duration::from_secs(10)), 2);
  }

  #[test]
  fn trim_keeps_sequence_numbers() {
    let now = Instant::now();
    let mut buffer = filled(ReplayPolicy::Unbounded, &[1, 2, 3, 4], now);
    buffer.trim(2);
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.get(1), None);
    assert_eq!(buffer.get(2), Some(&3));
    assert_eq!(buffer.window_start(now), 2);
    buffer.push(5, now);
    assert_eq!(buffer.get(4), Some(&5));
  }
}
