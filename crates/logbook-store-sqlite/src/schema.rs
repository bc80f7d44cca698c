//! SQL schema for the Logbook SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- AUTOINCREMENT: ids of deleted rows are never handed out again.
CREATE TABLE IF NOT EXISTS topics (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id      INTEGER,
    name           TEXT    NOT NULL,
    details        TEXT    NOT NULL DEFAULT '',
    pinned         INTEGER NOT NULL DEFAULT 0,
    has_structure  INTEGER NOT NULL DEFAULT 0,
    ordering_scope TEXT    NOT NULL,
    ordering_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    date           TEXT,               -- YYYY-MM-DD or NULL
    name           TEXT    NOT NULL,   -- plain text of title
    title          TEXT    NOT NULL DEFAULT '',
    details        TEXT    NOT NULL DEFAULT '',
    is_complete    INTEGER NOT NULL DEFAULT 1,
    ordering_scope TEXT    NOT NULL,
    ordering_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS structures (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT    NOT NULL,
    title_template TEXT    NOT NULL DEFAULT '',
    ordering_scope TEXT    NOT NULL,
    ordering_index INTEGER NOT NULL
);

-- Backlink graph: the documents of source mention target.
-- No foreign keys; cycles and dangling targets are representable.
CREATE TABLE IF NOT EXISTS mentions (
    source_kind TEXT    NOT NULL,   -- 'topic' | 'entry' | 'structure'
    source_id   INTEGER NOT NULL,
    target_kind TEXT    NOT NULL,
    target_id   INTEGER NOT NULL,
    PRIMARY KEY (source_kind, source_id, target_kind, target_id)
) WITHOUT ROWID;

-- Highest ordering index handed out per scope.
CREATE TABLE IF NOT EXISTS ordering_scopes (
    scope      TEXT    PRIMARY KEY,
    high_water INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS mentions_target_idx   ON mentions(target_kind, target_id, source_kind);
CREATE INDEX IF NOT EXISTS topics_scope_idx      ON topics(ordering_scope, ordering_index);
CREATE INDEX IF NOT EXISTS entries_scope_idx     ON entries(ordering_scope, ordering_index);
CREATE INDEX IF NOT EXISTS structures_scope_idx  ON structures(ordering_scope, ordering_index);

PRAGMA user_version = 1;
";
