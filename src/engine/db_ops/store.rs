//! Open the sync database and query/record per-item state.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use crate::types::DbView;

use super::{INSERT_ITEM_SQL, SCHEMA, WAL_PRAGMAS};

/// Facade over the sync-state database.
///
/// One row per synced item plus a single change-log token row. Writes are
/// serialized behind the connection mutex; a corrupted database surfaces as
/// an error and aborts the run.
pub struct SyncDatabase {
    conn: Mutex<Connection>,
}

fn apply_wal_and_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(())
}

fn row_to_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbView> {
    Ok(DbView {
        local_rel_path: row.get(0)?,
        remote_id: row.get(1)?,
        remote_rel_path: row.get(2)?,
        checksum: row.get(3)?,
        local_mtime_ns: row.get(4)?,
        remote_mtime_ns: row.get(5)?,
        is_folder: row.get::<_, i64>(6)? != 0,
    })
}

const SELECT_COLS: &str = "local_rel_path, remote_id, remote_rel_path, checksum, \
     local_mtime_ns, remote_mtime_ns, is_folder";

impl SyncDatabase {
    /// Open or create the database and ensure schema + WAL.
    pub fn open(path: &Path) -> Result<SyncDatabase> {
        let conn = Connection::open(path).context("open database")?;
        apply_wal_and_schema(&conn)?;
        Ok(SyncDatabase {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database with the same schema (no WAL pragmas needed).
    pub fn open_in_memory() -> Result<SyncDatabase> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.execute_batch(SCHEMA).context("create schema")?;
        Ok(SyncDatabase {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    /// Token persisted by the last fully successful run, if any.
    pub fn change_log_token(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT token FROM changelog_token WHERE id = 1", [], |r| {
                r.get(0)
            })
            .optional()
            .context("read change-log token")
        })
    }

    pub fn set_change_log_token(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO changelog_token (id, token) VALUES (1, ?1)",
                params![token],
            )
            .context("write change-log token")?;
            Ok(())
        })
    }

    pub fn row_by_local_path(&self, rel_path: &str) -> Result<Option<DbView>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLS} FROM items WHERE local_rel_path = ?1"),
                params![rel_path],
                row_to_view,
            )
            .optional()
            .context("query item by local path")
        })
    }

    pub fn row_by_remote_id(&self, remote_id: &str) -> Result<Option<DbView>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLS} FROM items WHERE remote_id = ?1"),
                params![remote_id],
                row_to_view,
            )
            .optional()
            .context("query item by remote id")
        })
    }

    pub fn checksum(&self, rel_path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.row_by_local_path(rel_path)?.and_then(|r| r.checksum))
    }

    /// Every local relative path with a recorded row, for the crawler's
    /// deletion pass.
    pub fn all_local_paths(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT local_rel_path FROM items ORDER BY local_rel_path")
                .context("prepare path listing")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .context("list local paths")?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.context("read local path row")?);
            }
            Ok(out)
        })
    }

    fn upsert(&self, view: &DbView) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                INSERT_ITEM_SQL,
                params![
                    view.local_rel_path,
                    view.remote_id,
                    view.remote_rel_path,
                    view.checksum,
                    view.local_mtime_ns,
                    view.remote_mtime_ns,
                    view.is_folder as i64,
                ],
            )
            .context("upsert item row")?;
            Ok(())
        })
    }

    pub fn record_upload(&self, view: &DbView) -> Result<()> {
        self.upsert(view)
    }

    pub fn record_download(&self, view: &DbView) -> Result<()> {
        self.upsert(view)
    }

    pub fn record_delete(&self, rel_path: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM items WHERE local_rel_path = ?1",
                params![rel_path],
            )
            .context("delete item row")?;
            Ok(())
        })
    }

    /// Move a row to a new local path (keep-both conflict rename).
    pub fn record_rename(&self, old_rel_path: &str, new_rel_path: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE items SET local_rel_path = ?2 WHERE local_rel_path = ?1",
                params![old_rel_path, new_rel_path],
            )
            .context("rename item row")?;
            Ok(())
        })
    }

    /// Refresh stored mtimes after a no-op reconciliation.
    pub fn refresh_mtimes(
        &self,
        rel_path: &str,
        local_mtime_ns: i64,
        remote_mtime_ns: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE items SET local_mtime_ns = ?2, remote_mtime_ns = ?3 \
                 WHERE local_rel_path = ?1",
                params![rel_path, local_mtime_ns, remote_mtime_ns],
            )
            .context("refresh item mtimes")?;
            Ok(())
        })
    }
}
