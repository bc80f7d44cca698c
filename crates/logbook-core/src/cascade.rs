//! Rename propagation.
//!
//! When an entity's display label changes, every document that mentions it
//! carries a stale cached label. [`propagate_rename`] walks the backlinks of
//! the renamed entity and rewrites each backlinking entity in its own store
//! transaction.
//!
//! The walk is an explicit FIFO queue guarded by a visited set, so mention
//! cycles (A mentions B, B mentions A) terminate and each entity is rewritten
//! at most once per call. Rewritten entities are leaf updates: only the
//! backlinks of the renamed entity itself are enqueued, and a relabel never
//! starts a cascade of its own.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  document::Document,
  entity::{EntityKind, EntityLabel, EntityRef},
  mention::extract,
  rewrite::relabel,
  store::{EntityWrite, LogStore},
};

// ─── Report ──────────────────────────────────────────────────────────────────

/// A backlinking entity that could not be rewritten.
#[derive(Debug)]
pub struct CascadeFailure {
  pub entity: EntityRef,
  pub error:  Error,
}

/// Per-item outcome of one cascade. There is no cascade-wide success flag:
/// rewrites that succeeded stay applied regardless of sibling failures.
#[derive(Debug)]
pub struct CascadeReport {
  pub renamed:   EntityLabel,
  /// Entities whose documents were rewritten and persisted.
  pub updated:   Vec<EntityRef>,
  /// Backlinking entities whose documents already carried the label, or no
  /// longer mention the renamed entity.
  pub unchanged: Vec<EntityRef>,
  pub failures:  Vec<CascadeFailure>,
}

impl CascadeReport {
  fn new(renamed: EntityLabel) -> Self {
    Self { renamed, updated: vec![], unchanged: vec![], failures: vec![] }
  }

  pub fn is_clean(&self) -> bool { self.failures.is_empty() }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Relabel every mention of `renamed.entity` to `renamed.label`.
///
/// Processes one backlinking entity at a time and returns once all of them
/// have been attempted.
pub async fn propagate_rename<S: LogStore>(
  store: &S,
  renamed: EntityLabel,
) -> CascadeReport {
  let origin = renamed.entity;
  let mut report = CascadeReport::new(renamed);
  let mut visited: HashSet<EntityRef> = HashSet::new();
  let mut queue: VecDeque<EntityRef> = VecDeque::new();

  for kind in EntityKind::ALL {
    match store.backlinks(origin, kind).await {
      Ok(ids) => {
        for id in ids {
          let source = EntityRef::new(kind, id);
          if visited.insert(source) {
            queue.push_back(source);
          }
        }
      }
      Err(e) => {
        warn!(%origin, %kind, error = %e, "backlink lookup failed");
        report.failures.push(CascadeFailure { entity: origin, error: Error::store(e) });
      }
    }
  }

  info!(%origin, label = %report.renamed.label, pending = queue.len(), "propagating rename");

  while let Some(source) = queue.pop_front() {
    match relabel_source(store, source, &report.renamed).await {
      Ok(true) => report.updated.push(source),
      Ok(false) => report.unchanged.push(source),
      Err(error) => {
        warn!(%source, %origin, %error, "failed to relabel backlinking entity");
        report.failures.push(CascadeFailure { entity: source, error });
      }
    }
  }

  info!(
    %origin,
    updated = report.updated.len(),
    unchanged = report.unchanged.len(),
    failed = report.failures.len(),
    "rename propagated"
  );
  report
}

/// Rewrite one backlinking entity. Returns whether anything was persisted.
async fn relabel_source<S: LogStore>(
  store: &S,
  source: EntityRef,
  renamed: &EntityLabel,
) -> Result<bool> {
  let Some(mut entity) = store.load(source).await.map_err(Error::store)? else {
    return Err(Error::Reference(source));
  };

  let mut changed = false;
  {
    let m = entity.as_mentionable_mut();
    for &field in m.document_fields() {
      let Some(raw) = m.document_mut(field) else {
        continue;
      };
      let document = Document::decode(raw)?;
      if !extract(&document, Some(renamed.entity.kind)).contains(renamed.entity) {
        debug!(%source, %field, target = %renamed.entity, "field no longer mentions target");
        continue;
      }
      let rewritten = relabel(&document, std::slice::from_ref(renamed));
      if rewritten != document {
        *raw = rewritten.encode()?;
        changed = true;
      }
    }
  }

  if changed {
    store
      .persist(EntityWrite::prepare(entity)?)
      .await
      .map_err(Error::store)?;
  }
  Ok(changed)
}
