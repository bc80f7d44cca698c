//! Sparse ordering indices for manually-ordered siblings.
//!
//! Indices are spaced [`STEP`] apart so a value can be slotted between two
//! neighbours without touching the rest of the scope. When two neighbours are
//! adjacent integers the scope is renormalized with [`spread`].

use std::fmt;

use chrono::NaiveDate;

use crate::entity::{EntityId, EntityKind};

/// Gap between consecutively allocated indices.
pub const STEP: i64 = 1 << 16;

/// The set of siblings an index is ordered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderingScope {
  /// Topics sharing a parent (`None` for top-level topics).
  Topics { parent: Option<EntityId> },
  /// Entries sharing a date and completion state.
  Entries { date: Option<NaiveDate>, complete: bool },
  Structures,
}

impl OrderingScope {
  pub fn kind(&self) -> EntityKind {
    match self {
      OrderingScope::Topics { .. } => EntityKind::Topic,
      OrderingScope::Entries { .. } => EntityKind::Entry,
      OrderingScope::Structures => EntityKind::Structure,
    }
  }

  /// Stable string form used as the storage key.
  pub fn key(&self) -> String { self.to_string() }
}

impl fmt::Display for OrderingScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OrderingScope::Topics { parent: None } => write!(f, "topics/root"),
      OrderingScope::Topics { parent: Some(p) } => write!(f, "topics/{p}"),
      OrderingScope::Entries { date, complete } => {
        let date = date.map_or_else(|| "undated".to_owned(), |d| d.to_string());
        let state = if *complete { "complete" } else { "pending" };
        write!(f, "entries/{date}/{state}")
      }
      OrderingScope::Structures => write!(f, "structures"),
    }
  }
}

/// The index following a scope's high-water mark.
pub fn after(high_water: Option<i64>) -> i64 { high_water.unwrap_or(0) + STEP }

/// An index strictly between two neighbours, or `None` when they are
/// adjacent and the scope needs renormalizing.
///
/// `lo = None` means "before the first sibling"; `hi = None` means "after
/// the last". Appending is served by [`after`] so that it stays above the
/// high-water mark, which is why `(Some, None)` is not handled here.
pub fn between(lo: Option<i64>, hi: Option<i64>) -> Option<i64> {
  match (lo, hi) {
    (None, None) => Some(STEP),
    (None, Some(hi)) => hi.checked_sub(STEP),
    (Some(lo), Some(hi)) if hi - lo > 1 => Some(lo + (hi - lo) / 2),
    _ => None,
  }
}

/// Evenly spaced indices for `count` siblings in order.
pub fn spread(count: usize) -> impl Iterator<Item = i64> {
  (1..=count as i64).map(|n| n * STEP)
}
