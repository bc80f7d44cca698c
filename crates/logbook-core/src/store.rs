//! The `LogStore` trait and the write types that cross it.
//!
//! The trait is implemented by storage backends (e.g. `logbook-store-sqlite`).
//! The propagation engine and [`crate::actions`] depend on this abstraction,
//! not on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use crate::{
  Result,
  document::{Document, canonicalize},
  entity::{Entity, EntityId, EntityKind, EntityRef},
  mention::{Mentions, extract},
  ordering::OrderingScope,
};

/// The kind every document mention is indexed against in the edge store.
pub const MENTION_TARGET_KIND: EntityKind = EntityKind::Topic;

// ─── Write types ─────────────────────────────────────────────────────────────

/// An entity ready to be persisted together with its outgoing edge set.
#[derive(Debug, Clone)]
pub struct EntityWrite {
  pub entity:      Entity,
  pub target_kind: EntityKind,
  pub targets:     BTreeSet<EntityId>,
}

impl EntityWrite {
  /// Canonicalize every document of `entity`, refresh derived fields and
  /// collect the mentions that become its outgoing edges.
  ///
  /// Fails with [`crate::Error::Format`] if any document is corrupt.
  pub fn prepare(mut entity: Entity) -> Result<Self> {
    let m = entity.as_mentionable_mut();
    for &field in m.document_fields() {
      if let Some(raw) = m.document_mut(field) {
        *raw = canonicalize(raw)?;
      }
    }
    m.refresh_derived()?;
    let mentions = document_mentions(&entity)?;
    Ok(Self {
      entity,
      target_kind: MENTION_TARGET_KIND,
      targets: mentions.ids(MENTION_TARGET_KIND),
    })
  }
}

/// Union of the target-kind mentions across all document fields of `entity`.
pub fn document_mentions(entity: &Entity) -> Result<Mentions> {
  let m = entity.as_mentionable();
  let mut mentions = Mentions::default();
  for &field in m.document_fields() {
    let raw = m.document(field).unwrap_or_default();
    mentions.merge(extract(&Document::decode(raw)?, Some(MENTION_TARGET_KIND)));
  }
  Ok(mentions)
}

/// The stored edges added and removed by one edge synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
  pub added:   Vec<EntityId>,
  pub removed: Vec<EntityId>,
}

impl EdgeDiff {
  pub fn is_empty(&self) -> bool { self.added.is_empty() && self.removed.is_empty() }

  /// Number of rows written.
  pub fn writes(&self) -> usize { self.added.len() + self.removed.len() }
}

/// The outcome of [`LogStore::persist`].
#[derive(Debug, Clone)]
pub struct Persisted {
  /// The stored entity, with its real id and ordering index assigned.
  pub entity:   Entity,
  /// The row as it was before this write; `None` on creation.
  pub previous: Option<Entity>,
  pub edges:    EdgeDiff,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Logbook storage backend.
///
/// `persist` is the unit of atomicity: an entity's fields and its outgoing
/// edges become visible together or not at all. Nothing spans more than one
/// entity.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait LogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Load an entity. Returns `None` if not found.
  fn load(
    &self,
    entity: EntityRef,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// All stored ids of `kind`, ascending.
  fn list_ids(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<Vec<EntityId>, Self::Error>> + Send + '_;

  /// Create or update an entity and synchronise its outgoing edges in one
  /// transaction.
  ///
  /// A virtual (non-positive) id is replaced by a freshly assigned one. The
  /// ordering index is kept while the entity stays in its scope and is
  /// allocated at the end of the destination scope otherwise.
  fn persist(
    &self,
    write: EntityWrite,
  ) -> impl Future<Output = Result<Persisted, Self::Error>> + Send + '_;

  /// Delete an entity and every edge where it is source or target.
  /// Returns the deleted entity, or `None` if it did not exist.
  fn delete(
    &self,
    entity: EntityRef,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  // ── Edges ─────────────────────────────────────────────────────────────

  /// Ids of `source_kind` entities whose documents mention `target`,
  /// ascending.
  fn backlinks(
    &self,
    target: EntityRef,
    source_kind: EntityKind,
  ) -> impl Future<Output = Result<Vec<EntityId>, Self::Error>> + Send + '_;

  /// Ids of `target_kind` entities mentioned by `source`.
  fn outgoing(
    &self,
    source: EntityRef,
    target_kind: EntityKind,
  ) -> impl Future<Output = Result<BTreeSet<EntityId>, Self::Error>> + Send + '_;

  /// Make the stored `(source, target_kind)` edges equal `targets`,
  /// writing only the difference.
  fn set_edges(
    &self,
    source: EntityRef,
    target_kind: EntityKind,
    targets: BTreeSet<EntityId>,
  ) -> impl Future<Output = Result<EdgeDiff, Self::Error>> + Send + '_;

  // ── Ordering ──────────────────────────────────────────────────────────

  /// Reserve the next index at the end of `scope`.
  fn allocate_index(
    &self,
    scope: OrderingScope,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Move `entity` directly after sibling `after` (first when `None`) within
  /// its current scope, renormalizing the scope if no gap remains.
  fn reorder(
    &self,
    entity: EntityRef,
    after: Option<EntityId>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Ids in `scope`, in ordering-index order.
  fn scope_members(
    &self,
    scope: OrderingScope,
  ) -> impl Future<Output = Result<Vec<EntityId>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::{Entry, Topic},
    session::Session,
  };

  #[test]
  fn prepare_unions_fields_and_derives_name() {
    let session = Session::new();
    let mut entry = Entry::new_virtual(
      &session,
      Document::new()
        .text("Dinner with ")
        .mention(EntityRef::topic(3), "Cy")
        .encode()
        .unwrap(),
      None,
    );
    entry.details = Document::new()
      .mention(EntityRef::topic(3), "Cy")
      .mention(EntityRef::topic(8), "Dot")
      .mention(EntityRef::entry(2), "ignored")
      .encode()
      .unwrap();

    let write = EntityWrite::prepare(entry.into()).unwrap();
    assert_eq!(write.target_kind, EntityKind::Topic);
    assert_eq!(write.targets.into_iter().collect::<Vec<_>>(), vec![3, 8]);
    assert_eq!(write.entity.label(), "Dinner with Cy");
  }

  #[test]
  fn prepare_stores_canonical_documents() {
    let session = Session::new();
    let mut topic = Topic::new_virtual(&session, "Plain", None);
    topic.details = "plaintext:hello".into();
    let write = EntityWrite::prepare(topic.into()).unwrap();
    let topic = write.entity.into_topic().unwrap();
    assert_eq!(topic.details, Document::from_plain_text("hello").encode().unwrap());

    let mut blank = Topic::new_virtual(&session, "Blank", None);
    blank.details = "plaintext:".into();
    let write = EntityWrite::prepare(blank.into()).unwrap();
    assert_eq!(write.entity.into_topic().unwrap().details, "");
  }

  #[test]
  fn prepare_rejects_corrupt_documents() {
    let session = Session::new();
    let mut topic = Topic::new_virtual(&session, "Broken", None);
    topic.details = "richtext:??".into();
    assert!(matches!(
      EntityWrite::prepare(topic.into()),
      Err(crate::Error::Format(_))
    ));
  }

  #[test]
  fn edge_diff_counts_writes() {
    let diff = EdgeDiff { added: vec![1, 2], removed: vec![3] };
    assert_eq!(diff.writes(), 3);
    assert!(EdgeDiff::default().is_empty());
  }
}
