use smallvec::SmallVec;

/// Arena of entries addressed by stable ids.
///
/// Subscribers that share one upstream (the connectable source) are kept
/// here so joining and leaving never disturbs the handles of the others.
/// Ids are never reused within one registry.
///
/// ```rust
/// use rxflow::subscription::Registry;
///
/// let mut subs = Registry::default();
/// let a = subs.add("a");
/// let b = subs.add("b");
/// assert_eq!(subs.remove(a), Some("a"));
/// assert!(subs.contains(b));
/// assert_eq!(subs.len(), 1);
/// ```
pub struct Registry<U> {
  next_id: usize,
  items: SmallVec<[(usize, U); 2]>,
}

impl<U> Default for Registry<U> {
  fn default() -> Self { Self { next_id: 0, items: SmallVec::new() } }
}

impl<U> Registry<U> {
  /// Add an entry and return its id.
  #[inline]
  pub fn add(&mut self, item: U) -> usize {
    let id = self.reserve_id();
    self.items.push((id, item));
    id
  }

  /// Reserve the next id without adding an entry, for entries that need to
  /// know their own id at construction.
  #[inline]
  pub fn reserve_id(&mut self) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Insert an entry under an id obtained from `reserve_id`.
  #[inline]
  pub fn insert(&mut self, id: usize, item: U) { self.items.push((id, item)); }

  pub fn remove(&mut self, id: usize) -> Option<U> {
    self.items.iter().position(|(i, _)| *i == id).map(|pos| self.items.remove(pos).1)
  }

  #[inline]
  pub fn contains(&self, id: usize) -> bool { self.items.iter().any(|(i, _)| *i == id) }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  #[inline]
  pub fn iter(&self) -> impl Iterator<Item = &U> { self.items.iter().map(|(_, item)| item) }

  #[inline]
  pub fn drain(&mut self) -> impl Iterator<Item = U> + '_ { self.items.drain(..).map(|(_, item)| item) }
}

impl<U: Clone> Registry<U> {
  /// Clone the current entries so they can be used without holding the
  /// lock that guards the registry.
  pub fn snapshot(&self) -> SmallVec<[U; 4]> { self.iter().cloned().collect() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_are_stable() {
    let mut r = Registry::default();
    let a = r.add(1);
    let reserved = r.reserve_id();
    let c = r.add(3);
    r.insert(reserved, 2);
    assert_eq!(r.remove(a), Some(1));
    assert_eq!(r.remove(a), None);
    assert!(r.contains(reserved));
    assert!(r.contains(c));
    let mut left: Vec<_> = r.snapshot().into_iter().collect();
    left.sort();
    assert_eq!(left, vec![2, 3]);
    assert_eq!(r.drain().count(), 2);
    assert!(r.is_empty());
  }
}
