//! SQLite-backed key-value table shared by every process.
//!
//! Each row carries the JSON value, a global revision and the id of the
//! process that wrote it. Revisions come from one monotonic sequence over
//! the whole table, so "what changed since N" is a single range query.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A key written after some revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvChange {
    pub key: String,
    pub revision: u64,
    pub origin: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Path of the default database file, `<data dir>/lockin.db`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(dir.join("lockin.db"))
    }

    /// Open the database in the data directory, creating it if needed.
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(&Self::default_path()?)
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.configure()?;
        db.migrate()?;
        Ok(db)
    }

    /// Private in-memory database. Not shared with other processes.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn configure(&self) -> Result<(), StoreError> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key      TEXT PRIMARY KEY,
                value    TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                origin   TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_kv_revision ON kv(revision);",
        )?;
        Ok(())
    }

    /// Raw JSON stored under `key`. Removed keys read as `None`.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.filter(|v| v != "null"))
    }

    /// Write `value` under `key` and return the revision assigned to it.
    pub fn kv_set(&self, key: &str, value: &str, origin: &str) -> Result<u64, StoreError> {
        let revision: i64 = self.conn.query_row(
            "INSERT INTO kv (key, value, revision, origin)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(revision), 0) + 1 FROM kv), ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                revision = excluded.revision,
                origin = excluded.origin
             RETURNING revision",
            params![key, value, origin],
            |row| row.get(0),
        )?;
        Ok(revision.max(0) as u64)
    }

    /// Tombstone `key` with JSON `null` so the revision still advances.
    pub fn kv_remove(&self, key: &str, origin: &str) -> Result<u64, StoreError> {
        self.kv_set(key, "null", origin)
    }

    /// Highest revision written so far, `0` for an empty table.
    pub fn revision(&self) -> Result<u64, StoreError> {
        let revision: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(revision), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(revision.max(0) as u64)
    }

    /// Keys written after `revision`, oldest first.
    pub fn changes_since(&self, revision: u64) -> Result<Vec<KvChange>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, revision, origin FROM kv WHERE revision > ?1 ORDER BY revision ASC",
        )?;
        let rows = stmt.query_map(params![revision as i64], |row| {
            Ok(KvChange {
                key: row.get(0)?,
                revision: row.get::<_, i64>(1)?.max(0) as u64,
                origin: row.get(2)?,
            })
        })?;
        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    /// Every live key, for listing.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE value != 'null' ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}
