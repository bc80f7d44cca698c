//! Encoding and decoding helpers between Rust domain types and the column
//! values stored in SQLite.
//!
//! Dates are stored as `YYYY-MM-DD`. Entity kinds are stored as their
//! snake_case names. Documents are stored as their raw encoded strings and
//! are never decoded by the store.

use chrono::NaiveDate;
use logbook_core::entity::{Entity, EntityId, EntityKind, Entry, Structure, Topic};
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_kind(kind: EntityKind) -> &'static str { kind.into() }

pub fn encode_date(date: NaiveDate) -> String { date.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("invalid date {s:?}: {e}")))
}

/// Table holding rows of `kind`.
pub fn table(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::Topic => "topics",
    EntityKind::Entry => "entries",
    EntityKind::Structure => "structures",
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw column values of a `topics` row.
pub struct RawTopic {
  pub id:             i64,
  pub parent_id:      Option<i64>,
  pub name:           String,
  pub details:        String,
  pub pinned:         bool,
  pub has_structure:  bool,
  pub ordering_index: i64,
}

/// Raw column values of an `entries` row.
pub struct RawEntry {
  pub id:             i64,
  pub date:           Option<String>,
  pub name:           String,
  pub title:          String,
  pub details:        String,
  pub is_complete:    bool,
  pub ordering_index: i64,
}

/// Raw column values of a `structures` row.
pub struct RawStructure {
  pub id:             i64,
  pub name:           String,
  pub title_template: String,
  pub ordering_index: i64,
}

pub enum RawEntity {
  Topic(RawTopic),
  Entry(RawEntry),
  Structure(RawStructure),
}

/// A row as read back, together with the scope it is ordered in.
pub struct StoredRow {
  pub raw:   RawEntity,
  pub scope: String,
}

const TOPIC_COLUMNS: &str =
  "id, parent_id, name, details, pinned, has_structure, ordering_index, ordering_scope";
const ENTRY_COLUMNS: &str =
  "id, date, name, title, details, is_complete, ordering_index, ordering_scope";
const STRUCTURE_COLUMNS: &str =
  "id, name, title_template, ordering_index, ordering_scope";

impl RawEntity {
  /// Columns of `entity`. A missing ordering index is stored as `0` until
  /// the store assigns one.
  pub fn from_entity(entity: &Entity) -> Self {
    match entity {
      Entity::Topic(t) => RawEntity::Topic(RawTopic {
        id:             t.id,
        parent_id:      t.parent_id,
        name:           t.name.clone(),
        details:        t.details.clone(),
        pinned:         t.pinned,
        has_structure:  t.has_structure,
        ordering_index: t.ordering_index.unwrap_or_default(),
      }),
      Entity::Entry(e) => RawEntity::Entry(RawEntry {
        id:             e.id,
        date:           e.date.map(encode_date),
        name:           e.name.clone(),
        title:          e.title.clone(),
        details:        e.details.clone(),
        is_complete:    e.is_complete,
        ordering_index: e.ordering_index.unwrap_or_default(),
      }),
      Entity::Structure(s) => RawEntity::Structure(RawStructure {
        id:             s.id,
        name:           s.name.clone(),
        title_template: s.title_template.clone(),
        ordering_index: s.ordering_index.unwrap_or_default(),
      }),
    }
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(match self {
      RawEntity::Topic(r) => Entity::Topic(Topic {
        id:             r.id,
        parent_id:      r.parent_id,
        name:           r.name,
        details:        r.details,
        pinned:         r.pinned,
        has_structure:  r.has_structure,
        ordering_index: Some(r.ordering_index),
      }),
      RawEntity::Entry(r) => Entity::Entry(Entry {
        id:             r.id,
        date:           r.date.as_deref().map(decode_date).transpose()?,
        name:           r.name,
        title:          r.title,
        details:        r.details,
        is_complete:    r.is_complete,
        ordering_index: Some(r.ordering_index),
      }),
      RawEntity::Structure(r) => Entity::Structure(Structure {
        id:             r.id,
        name:           r.name,
        title_template: r.title_template,
        ordering_index: Some(r.ordering_index),
      }),
    })
  }

  pub fn id(&self) -> EntityId {
    match self {
      RawEntity::Topic(r) => r.id,
      RawEntity::Entry(r) => r.id,
      RawEntity::Structure(r) => r.id,
    }
  }

  pub fn ordering_index(&self) -> i64 {
    match self {
      RawEntity::Topic(r) => r.ordering_index,
      RawEntity::Entry(r) => r.ordering_index,
      RawEntity::Structure(r) => r.ordering_index,
    }
  }

  pub fn set_ordering_index(&mut self, index: i64) {
    match self {
      RawEntity::Topic(r) => r.ordering_index = index,
      RawEntity::Entry(r) => r.ordering_index = index,
      RawEntity::Structure(r) => r.ordering_index = index,
    }
  }

  // ── SQL ───────────────────────────────────────────────────────────────────

  /// Read the row of `kind` with `id`, if any.
  pub fn select(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
  ) -> rusqlite::Result<Option<StoredRow>> {
    let (columns, map_row): (&str, fn(&Row<'_>) -> rusqlite::Result<StoredRow>) = match kind {
      EntityKind::Topic => (TOPIC_COLUMNS, topic_row),
      EntityKind::Entry => (ENTRY_COLUMNS, entry_row),
      EntityKind::Structure => (STRUCTURE_COLUMNS, structure_row),
    };
    conn
      .query_row(
        &format!("SELECT {columns} FROM {} WHERE id = ?1", table(kind)),
        params![id],
        map_row,
      )
      .optional()
  }

  /// Insert (non-positive id) or update this row. Returns the row id.
  pub fn write(&self, conn: &Connection, scope: &str) -> rusqlite::Result<EntityId> {
    let id = self.id();
    let insert = id <= 0;
    match self {
      RawEntity::Topic(r) if insert => {
        conn.execute(
          "INSERT INTO topics (
             parent_id, name, details, pinned, has_structure,
             ordering_scope, ordering_index
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          params![
            r.parent_id, r.name, r.details, r.pinned, r.has_structure,
            scope, r.ordering_index,
          ],
        )?;
      }
      RawEntity::Topic(r) => {
        conn.execute(
          "UPDATE topics SET
             parent_id = ?2, name = ?3, details = ?4, pinned = ?5,
             has_structure = ?6, ordering_scope = ?7, ordering_index = ?8
           WHERE id = ?1",
          params![
            id, r.parent_id, r.name, r.details, r.pinned, r.has_structure,
            scope, r.ordering_index,
          ],
        )?;
      }
      RawEntity::Entry(r) if insert => {
        conn.execute(
          "INSERT INTO entries (
             date, name, title, details, is_complete,
             ordering_scope, ordering_index
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          params![
            r.date, r.name, r.title, r.details, r.is_complete,
            scope, r.ordering_index,
          ],
        )?;
      }
      RawEntity::Entry(r) => {
        conn.execute(
          "UPDATE entries SET
             date = ?2, name = ?3, title = ?4, details = ?5,
             is_complete = ?6, ordering_scope = ?7, ordering_index = ?8
           WHERE id = ?1",
          params![
            id, r.date, r.name, r.title, r.details, r.is_complete,
            scope, r.ordering_index,
          ],
        )?;
      }
      RawEntity::Structure(r) if insert => {
        conn.execute(
          "INSERT INTO structures (name, title_template, ordering_scope, ordering_index)
           VALUES (?1, ?2, ?3, ?4)",
          params![r.name, r.title_template, scope, r.ordering_index],
        )?;
      }
      RawEntity::Structure(r) => {
        conn.execute(
          "UPDATE structures SET
             name = ?2, title_template = ?3, ordering_scope = ?4, ordering_index = ?5
           WHERE id = ?1",
          params![id, r.name, r.title_template, scope, r.ordering_index],
        )?;
      }
    }
    Ok(if insert { conn.last_insert_rowid() } else { id })
  }
}

fn topic_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
  Ok(StoredRow {
    raw:   RawEntity::Topic(RawTopic {
      id:             row.get(0)?,
      parent_id:      row.get(1)?,
      name:           row.get(2)?,
      details:        row.get(3)?,
      pinned:         row.get(4)?,
      has_structure:  row.get(5)?,
      ordering_index: row.get(6)?,
    }),
    scope: row.get(7)?,
  })
}

fn entry_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
  Ok(StoredRow {
    raw:   RawEntity::Entry(RawEntry {
      id:             row.get(0)?,
      date:           row.get(1)?,
      name:           row.get(2)?,
      title:          row.get(3)?,
      details:        row.get(4)?,
      is_complete:    row.get(5)?,
      ordering_index: row.get(6)?,
    }),
    scope: row.get(7)?,
  })
}

fn structure_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
  Ok(StoredRow {
    raw:   RawEntity::Structure(RawStructure {
      id:             row.get(0)?,
      name:           row.get(1)?,
      title_template: row.get(2)?,
      ordering_index: row.get(3)?,
    }),
    scope: row.get(4)?,
  })
}

/// The entity's ordering scope key, as stored in `ordering_scope`.
pub fn scope_key(entity: &Entity) -> String {
  entity.as_mentionable().ordering_scope().key()
}
