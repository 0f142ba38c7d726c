//! Locking helper shared by every operator.
//!
//! A panic inside a user callback may poison the mutex it ran under. The
//! guarded state is still usable afterwards, so the poison flag is ignored.
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  #[test]
  fn survives_poison() {
    let shared = Arc::new(Mutex::new(vec![1]));
    let c_shared = shared.clone();
    let _ = std::thread::spawn(move || {
      let _guard = c_shared.lock().unwrap();
      panic!("poison");
    })
    .join();
    lock(&shared).push(2);
    assert_eq!(*lock(&shared), vec![1, 2]);
  }
}
