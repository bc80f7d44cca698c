//! [`SqliteStore`]: the SQLite implementation of [`LogStore`].

use std::{collections::BTreeSet, path::Path};

use rusqlite::{Connection, OptionalExtension as _};
use tracing::debug;

use logbook_core::{
  entity::{Entity, EntityId, EntityKind, EntityRef},
  ordering::{self, OrderingScope},
  store::{EdgeDiff, EntityWrite, LogStore, Persisted},
};

use crate::{
  Error, Result,
  encode::{RawEntity, encode_kind, scope_key, table},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Logbook store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// What a `persist` transaction ended with.
enum PersistOutcome {
  Written {
    id:       EntityId,
    index:    i64,
    previous: Option<RawEntity>,
    edges:    EdgeDiff,
  },
  /// A positive id with no row behind it.
  Missing,
  /// An edge insert hit an existing row; the transaction was rolled back.
  Conflict(EntityId),
}

fn edge_conflict(source: EntityRef, target_kind: EntityKind, target: EntityId) -> Error {
  Error::Core(logbook_core::Error::EdgeConflict {
    from: source,
    to:   EntityRef::new(target_kind, target),
  })
}

impl LogStore for SqliteStore {
  type Error = Error;

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn load(&self, entity: EntityRef) -> Result<Option<Entity>> {
    let row = self
      .conn
      .call(move |conn| Ok(RawEntity::select(conn, entity.kind, entity.id)?))
      .await?;

    row.map(|row| row.raw.into_entity()).transpose()
  }

  async fn list_ids(&self, kind: EntityKind) -> Result<Vec<EntityId>> {
    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT id FROM {} ORDER BY id", table(kind)))?;
        let ids = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<EntityId>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  async fn persist(&self, write: EntityWrite) -> Result<Persisted> {
    let EntityWrite { mut entity, target_kind, targets } = write;
    let kind = entity.kind();
    let scope = scope_key(&entity);
    let mut raw = RawEntity::from_entity(&entity);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let previous = match raw.id() {
          id if id > 0 => match RawEntity::select(&tx, kind, id)? {
            Some(row) => Some(row),
            None => return Ok(PersistOutcome::Missing),
          },
          _ => None,
        };

        // Staying in the same scope keeps the stored position; anything else
        // lands at the end of the destination scope.
        let index = match &previous {
          Some(prev) if prev.scope == scope => prev.raw.ordering_index(),
          _ => allocate_in(&tx, &scope)?,
        };
        raw.set_ordering_index(index);
        let id = raw.write(&tx, &scope)?;

        let source = EntityRef::new(kind, id);
        let edges = match sync_edges(&tx, source, target_kind, &targets)? {
          Ok(edges) => edges,
          Err(target) => return Ok(PersistOutcome::Conflict(target)),
        };

        tx.commit()?;
        Ok(PersistOutcome::Written { id, index, previous: previous.map(|p| p.raw), edges })
      })
      .await?;

    match outcome {
      PersistOutcome::Written { id, index, previous, edges } => {
        let m = entity.as_mentionable_mut();
        m.set_id(id);
        m.set_ordering_index(index);
        debug!(
          entity = %m.entity_ref(),
          index,
          added = edges.added.len(),
          removed = edges.removed.len(),
          "persisted"
        );
        Ok(Persisted {
          entity,
          previous: previous.map(RawEntity::into_entity).transpose()?,
          edges,
        })
      }
      PersistOutcome::Missing => {
        Err(Error::Core(logbook_core::Error::NotFound(entity.entity_ref())))
      }
      PersistOutcome::Conflict(target) => {
        Err(edge_conflict(entity.entity_ref(), target_kind, target))
      }
    }
  }

  async fn delete(&self, entity: EntityRef) -> Result<Option<Entity>> {
    let kind_str = encode_kind(entity.kind);

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(row) = RawEntity::select(&tx, entity.kind, entity.id)? else {
          return Ok(None);
        };
        tx.execute(
          &format!("DELETE FROM {} WHERE id = ?1", table(entity.kind)),
          rusqlite::params![entity.id],
        )?;
        tx.execute(
          "DELETE FROM mentions
           WHERE (source_kind = ?1 AND source_id = ?2)
              OR (target_kind = ?1 AND target_id = ?2)",
          rusqlite::params![kind_str, entity.id],
        )?;
        tx.commit()?;
        Ok(Some(row.raw))
      })
      .await?;

    removed.map(RawEntity::into_entity).transpose()
  }

  // ── Edges ─────────────────────────────────────────────────────────────────

  async fn backlinks(
    &self,
    target: EntityRef,
    source_kind: EntityKind,
  ) -> Result<Vec<EntityId>> {
    let target_kind = encode_kind(target.kind);
    let source_kind = encode_kind(source_kind);

    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT source_id FROM mentions
           WHERE target_kind = ?1 AND target_id = ?2 AND source_kind = ?3
           ORDER BY source_id",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![target_kind, target.id, source_kind], |row| {
            row.get(0)
          })?
          .collect::<rusqlite::Result<Vec<EntityId>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  async fn outgoing(
    &self,
    source: EntityRef,
    target_kind: EntityKind,
  ) -> Result<BTreeSet<EntityId>> {
    let targets = self
      .conn
      .call(move |conn| Ok(stored_targets(conn, source, target_kind)?))
      .await?;
    Ok(targets)
  }

  async fn set_edges(
    &self,
    source: EntityRef,
    target_kind: EntityKind,
    targets: BTreeSet<EntityId>,
  ) -> Result<EdgeDiff> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let diff = sync_edges(&tx, source, target_kind, &targets)?;
        if diff.is_ok() {
          tx.commit()?;
        }
        Ok(diff)
      })
      .await?;

    outcome.map_err(|target| edge_conflict(source, target_kind, target))
  }

  // ── Ordering ──────────────────────────────────────────────────────────────

  async fn allocate_index(&self, scope: OrderingScope) -> Result<i64> {
    let scope = scope.key();
    let index = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let index = allocate_in(&tx, &scope)?;
        tx.commit()?;
        Ok(index)
      })
      .await?;
    Ok(index)
  }

  async fn reorder(&self, entity: EntityRef, after: Option<EntityId>) -> Result<i64> {
    let table = table(entity.kind);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let scope: Option<String> = tx
          .query_row(
            &format!("SELECT ordering_scope FROM {table} WHERE id = ?1"),
            rusqlite::params![entity.id],
            |row| row.get(0),
          )
          .optional()?;
        let Some(scope) = scope else {
          return Ok(Err(entity.id));
        };

        let siblings: Vec<(EntityId, i64)> = members_in(&tx, table, &scope)?
          .into_iter()
          .filter(|(id, _)| *id != entity.id)
          .collect();
        let position = match after {
          None => 0,
          Some(anchor) => match siblings.iter().position(|(id, _)| *id == anchor) {
            Some(p) => p + 1,
            None => return Ok(Err(anchor)),
          },
        };

        let lo = position.checked_sub(1).map(|p| siblings[p].1);
        let hi = siblings.get(position).map(|(_, index)| *index);
        let index = match hi {
          None => allocate_in(&tx, &scope)?,
          Some(_) => match ordering::between(lo, hi) {
            Some(index) => index,
            None => {
              let mut order: Vec<EntityId> = siblings.iter().map(|(id, _)| *id).collect();
              order.insert(position, entity.id);
              renormalize(&tx, table, &scope, &order)?;
              (position as i64 + 1) * ordering::STEP
            }
          },
        };
        tx.execute(
          &format!("UPDATE {table} SET ordering_index = ?2 WHERE id = ?1"),
          rusqlite::params![entity.id, index],
        )?;

        tx.commit()?;
        Ok(Ok(index))
      })
      .await?;

    let index = outcome.map_err(|id| {
      Error::Core(logbook_core::Error::NotFound(EntityRef::new(entity.kind, id)))
    })?;
    debug!(%entity, ?after, index, "reordered");
    Ok(index)
  }

  async fn scope_members(&self, scope: OrderingScope) -> Result<Vec<EntityId>> {
    let table = table(scope.kind());
    let scope = scope.key();

    let members = self
      .conn
      .call(move |conn| Ok(members_in(conn, table, &scope)?))
      .await?;
    Ok(members.into_iter().map(|(id, _)| id).collect())
  }
}

// ─── Transaction helpers ─────────────────────────────────────────────────────

fn stored_targets(
  conn: &Connection,
  source: EntityRef,
  target_kind: EntityKind,
) -> rusqlite::Result<BTreeSet<EntityId>> {
  let mut stmt = conn.prepare(
    "SELECT target_id FROM mentions
     WHERE source_kind = ?1 AND source_id = ?2 AND target_kind = ?3",
  )?;
  stmt
    .query_map(
      rusqlite::params![encode_kind(source.kind), source.id, encode_kind(target_kind)],
      |row| row.get(0),
    )?
    .collect()
}

/// Make the stored edges of `(source, target_kind)` equal `targets`.
///
/// The inner `Err` carries a target whose insert found its row already
/// present; the caller must not commit.
fn sync_edges(
  conn: &Connection,
  source: EntityRef,
  target_kind: EntityKind,
  targets: &BTreeSet<EntityId>,
) -> rusqlite::Result<std::result::Result<EdgeDiff, EntityId>> {
  let stored = stored_targets(conn, source, target_kind)?;
  let diff = EdgeDiff {
    added:   targets.difference(&stored).copied().collect(),
    removed: stored.difference(targets).copied().collect(),
  };

  let source_kind = encode_kind(source.kind);
  let target_kind = encode_kind(target_kind);
  for target in &diff.removed {
    conn.execute(
      "DELETE FROM mentions
       WHERE source_kind = ?1 AND source_id = ?2 AND target_kind = ?3 AND target_id = ?4",
      rusqlite::params![source_kind, source.id, target_kind, target],
    )?;
  }
  for &target in &diff.added {
    let inserted = conn.execute(
      "INSERT OR IGNORE INTO mentions (source_kind, source_id, target_kind, target_id)
       VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![source_kind, source.id, target_kind, target],
    )?;
    if inserted == 0 {
      return Ok(Err(target));
    }
  }
  Ok(Ok(diff))
}

/// Reserve the next index of `scope` by bumping its high-water mark.
fn allocate_in(conn: &Connection, scope: &str) -> rusqlite::Result<i64> {
  let high_water: Option<i64> = conn
    .query_row(
      "SELECT high_water FROM ordering_scopes WHERE scope = ?1",
      rusqlite::params![scope],
      |row| row.get(0),
    )
    .optional()?;
  let index = ordering::after(high_water);
  conn.execute(
    "INSERT INTO ordering_scopes (scope, high_water) VALUES (?1, ?2)
     ON CONFLICT(scope) DO UPDATE SET high_water = excluded.high_water",
    rusqlite::params![scope, index],
  )?;
  Ok(index)
}

/// `(id, ordering_index)` of every row in `scope`, in order.
fn members_in(
  conn: &Connection,
  table: &str,
  scope: &str,
) -> rusqlite::Result<Vec<(EntityId, i64)>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT id, ordering_index FROM {table}
     WHERE ordering_scope = ?1
     ORDER BY ordering_index, id"
  ))?;
  stmt
    .query_map(rusqlite::params![scope], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect()
}

/// Re-space the whole scope in `order` and keep the high-water mark above it.
fn renormalize(
  conn: &Connection,
  table: &str,
  scope: &str,
  order: &[EntityId],
) -> rusqlite::Result<()> {
  let sql = format!("UPDATE {table} SET ordering_index = ?2 WHERE id = ?1");
  let mut last = 0;
  for (id, index) in order.iter().zip(ordering::spread(order.len())) {
    conn.execute(&sql, rusqlite::params![id, index])?;
    last = index;
  }
  conn.execute(
    "INSERT INTO ordering_scopes (scope, high_water) VALUES (?1, ?2)
     ON CONFLICT(scope) DO UPDATE SET high_water = MAX(high_water, excluded.high_water)",
    rusqlite::params![scope, last],
  )?;
  debug!(scope, members = order.len(), "renormalized ordering scope");
  Ok(())
}
