//! Database operations: schema, open, and the sync-state facade.

mod store;

pub use store::SyncDatabase;

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Schema for the items and changelog_token tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    local_rel_path TEXT PRIMARY KEY,
    remote_id TEXT NOT NULL,
    remote_rel_path TEXT NOT NULL,
    checksum BLOB,
    local_mtime_ns INTEGER NOT NULL,
    remote_mtime_ns INTEGER NOT NULL,
    is_folder INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_items_remote_id ON items(remote_id);

CREATE TABLE IF NOT EXISTS changelog_token (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    token TEXT NOT NULL
);
"#;

/// Upsert statement for the items table.
pub(crate) const INSERT_ITEM_SQL: &str = "INSERT OR REPLACE INTO items \
    (local_rel_path, remote_id, remote_rel_path, checksum, local_mtime_ns, remote_mtime_ns, is_folder) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
