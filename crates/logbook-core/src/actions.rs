//! Entry points for the request layer.
//!
//! [`Actions`] wraps a [`LogStore`] and runs the codec → extractor → edge
//! store pipeline on every write, the rename cascade when a topic's name
//! changes, and the out-of-band consistency rescan.

use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use crate::{
  Error, Result,
  cascade::{CascadeFailure, CascadeReport, propagate_rename},
  document::Document,
  entity::{Entity, EntityId, EntityKind, EntityLabel, EntityRef, Entry, Structure, Topic},
  mention::extract,
  rewrite::relabel,
  store::{EntityWrite, LogStore, MENTION_TARGET_KIND},
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// The outcome of an upsert.
#[derive(Debug)]
pub struct Upserted {
  pub id:      EntityId,
  /// The entity as stored.
  pub entity:  Entity,
  /// Present when the write renamed a mention target.
  pub cascade: Option<CascadeReport>,
}

/// The outcome of [`Actions::consistency_check`].
#[derive(Debug, Default)]
pub struct ConsistencyReport {
  /// Entities scanned.
  pub checked:  usize,
  /// Entities whose documents or edges were rewritten.
  pub repaired: Vec<EntityRef>,
  pub failures: Vec<CascadeFailure>,
}

// ─── Actions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Actions<S> {
  store: S,
}

impl<S: LogStore> Actions<S> {
  pub fn new(store: S) -> Self { Self { store } }

  pub fn store(&self) -> &S { &self.store }

  pub async fn upsert_topic(&self, topic: Topic) -> Result<Upserted> {
    self.upsert(topic.into()).await
  }

  pub async fn upsert_entry(&self, entry: Entry) -> Result<Upserted> {
    self.upsert(entry.into()).await
  }

  pub async fn upsert_structure(&self, structure: Structure) -> Result<Upserted> {
    self.upsert(structure.into()).await
  }

  pub async fn delete_topic(&self, id: EntityId) -> Result<EntityRef> {
    self.delete(EntityRef::topic(id)).await
  }

  pub async fn delete_entry(&self, id: EntityId) -> Result<EntityRef> {
    self.delete(EntityRef::entry(id)).await
  }

  pub async fn delete_structure(&self, id: EntityId) -> Result<EntityRef> {
    self.delete(EntityRef::structure(id)).await
  }

  /// Persist `entity` with its outgoing edges, then propagate a rename if
  /// the stored label of a mention target changed.
  pub async fn upsert(&self, entity: Entity) -> Result<Upserted> {
    let write = EntityWrite::prepare(entity)?;
    let persisted = self.store.persist(write).await.map_err(Error::store)?;

    let entity_ref = persisted.entity.entity_ref();
    let label = persisted.entity.label();
    let renamed = entity_ref.kind == MENTION_TARGET_KIND
      && persisted
        .previous
        .as_ref()
        .is_some_and(|previous| previous.label() != label);

    let cascade = if renamed {
      Some(propagate_rename(&self.store, EntityLabel::new(entity_ref, label)).await)
    } else {
      None
    };

    Ok(Upserted { id: entity_ref.id, entity: persisted.entity, cascade })
  }

  /// Delete an entity. Mentions of it elsewhere do not block deletion.
  pub async fn delete(&self, entity: EntityRef) -> Result<EntityRef> {
    match self.store.delete(entity).await.map_err(Error::store)? {
      Some(_) => {
        info!(%entity, "deleted");
        Ok(entity)
      }
      None => Err(Error::NotFound(entity)),
    }
  }

  // ── Rescan ────────────────────────────────────────────────────────────────

  /// Rescan every document of every kind: relabel mentions to current labels
  /// and resynchronise outgoing edges. Entities already consistent are not
  /// written, so a second run repairs nothing.
  pub async fn consistency_check(&self) -> Result<ConsistencyReport> {
    let mut report = ConsistencyReport::default();
    let mut labels: HashMap<EntityRef, Option<String>> = HashMap::new();

    for kind in EntityKind::ALL {
      let ids = self.store.list_ids(kind).await.map_err(Error::store)?;
      for id in ids {
        let entity = EntityRef::new(kind, id);
        report.checked += 1;
        match self.heal(entity, &mut labels).await {
          Ok(true) => report.repaired.push(entity),
          Ok(false) => {}
          Err(error) => {
            warn!(%entity, %error, "consistency check failed for entity");
            report.failures.push(CascadeFailure { entity, error });
          }
        }
      }
    }

    info!(
      checked = report.checked,
      repaired = report.repaired.len(),
      failed = report.failures.len(),
      "consistency check finished"
    );
    Ok(report)
  }

  async fn heal(
    &self,
    source: EntityRef,
    labels: &mut HashMap<EntityRef, Option<String>>,
  ) -> Result<bool> {
    // Deleted between listing and loading; nothing to repair.
    let Some(mut entity) = self.store.load(source).await.map_err(Error::store)? else {
      return Ok(false);
    };

    let mut documents_changed = false;
    let fields = entity.as_mentionable().document_fields();
    for &field in fields {
      let raw = entity.as_mentionable().document(field).unwrap_or_default().to_owned();
      let document = Document::decode(&raw)?;

      let mut current = vec![];
      for mention in extract(&document, Some(MENTION_TARGET_KIND)).iter() {
        match self.current_label(mention.entity, labels).await? {
          Some(label) => current.push(EntityLabel::new(mention.entity, label)),
          None => {
            let error = Error::Reference(mention.entity);
            warn!(%source, %field, %error, "leaving unresolvable mention untouched");
          }
        }
      }

      let encoded = relabel(&document, &current).encode()?;
      if encoded != raw
        && let Some(slot) = entity.as_mentionable_mut().document_mut(field)
      {
        *slot = encoded;
        documents_changed = true;
      }
    }

    let write = EntityWrite::prepare(entity)?;
    let stored: BTreeSet<EntityId> = self
      .store
      .outgoing(source, write.target_kind)
      .await
      .map_err(Error::store)?;
    if !documents_changed && stored == write.targets {
      return Ok(false);
    }

    let persisted = self.store.persist(write).await.map_err(Error::store)?;
    info!(%source, edges = persisted.edges.writes(), documents_changed, "repaired drift");
    Ok(true)
  }

  async fn current_label(
    &self,
    entity: EntityRef,
    labels: &mut HashMap<EntityRef, Option<String>>,
  ) -> Result<Option<String>> {
    if let Some(cached) = labels.get(&entity) {
      return Ok(cached.clone());
    }
    let label = self
      .store
      .load(entity)
      .await
      .map_err(Error::store)?
      .map(|e| e.label());
    labels.insert(entity, label.clone());
    Ok(label)
  }
}
