//! Per-session allocation of virtual identities.
//!
//! An unsaved entity carries a negative id until its first successful save.
//! The counter lives in a [`Session`] value that callers thread through
//! entity construction; two sessions never share a sequence.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::entity::EntityId;

#[derive(Debug, Default)]
pub struct Session {
  last_virtual_id: AtomicI64,
}

impl Session {
  pub fn new() -> Self { Self::default() }

  /// Return the next virtual id: `-1`, `-2`, … strictly decreasing.
  pub fn next_virtual_id(&self) -> EntityId {
    self.last_virtual_id.fetch_sub(1, Ordering::Relaxed) - 1
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_strictly_decrease() {
    let session = Session::new();
    let ids: Vec<_> = (0..4).map(|_| session.next_virtual_id()).collect();
    assert_eq!(ids, vec![-1, -2, -3, -4]);
  }

  #[test]
  fn sessions_are_independent() {
    let a = Session::new();
    let b = Session::new();
    assert_eq!(a.next_virtual_id(), -1);
    assert_eq!(a.next_virtual_id(), -2);
    assert_eq!(b.next_virtual_id(), -1);
  }
}
