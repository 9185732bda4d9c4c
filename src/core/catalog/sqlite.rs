//! SQLite catalog storage.

use super::{BacklogEntry, Torrent};
use crate::error::CatalogError;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed catalog of torrents and backlog entries
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteCatalog {
    /// Open or create a catalog database at the given path
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| CatalogError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS torrents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash_string TEXT NOT NULL,
                name TEXT NOT NULL,
                copied INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS backlogs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                expire INTEGER NOT NULL,
                added INTEGER NOT NULL,
                runs INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// Where the database lives
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::Corrupted {
            path: self.db_path.clone(),
        })
    }

    fn from_timestamp(timestamp: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Record a new torrent, not yet copied
    pub fn add_torrent(&self, hash_string: &str, name: &str) -> Result<Torrent, CatalogError> {
        let conn = self.connection()?;

        conn.execute(
            "INSERT INTO torrents (hash_string, name, copied) VALUES (?, ?, 0)",
            params![hash_string, name],
        )
        .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        Ok(Torrent {
            id: conn.last_insert_rowid(),
            hash_string: hash_string.to_string(),
            name: name.to_string(),
            copied: false,
        })
    }

    /// Flag a torrent as copied. Returns false if no such torrent exists.
    pub fn mark_copied(&self, id: i64) -> Result<bool, CatalogError> {
        let conn = self.connection()?;

        let changed = conn
            .execute("UPDATE torrents SET copied = 1 WHERE id = ?", [id])
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        Ok(changed > 0)
    }

    /// All torrents, oldest first
    pub fn torrents(&self) -> Result<Vec<Torrent>, CatalogError> {
        let conn = self.connection()?;

        let mut stmt = conn
            .prepare("SELECT id, hash_string, name, copied FROM torrents ORDER BY id")
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Torrent {
                    id: row.get(0)?,
                    hash_string: row.get(1)?,
                    name: row.get(2)?,
                    copied: row.get::<_, i64>(3)? != 0,
                })
            })
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))
    }

    /// Queue a path for retrying until `expire`
    pub fn add_backlog(
        &self,
        path: &Path,
        expire: DateTime<Utc>,
    ) -> Result<BacklogEntry, CatalogError> {
        let conn = self.connection()?;
        let added = Self::from_timestamp(Utc::now().timestamp());

        conn.execute(
            "INSERT INTO backlogs (path, expire, added, runs) VALUES (?, ?, ?, 0)",
            params![
                path.to_string_lossy(),
                expire.timestamp(),
                added.timestamp()
            ],
        )
        .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        Ok(BacklogEntry {
            id: conn.last_insert_rowid(),
            path: path.to_path_buf(),
            expire: Self::from_timestamp(expire.timestamp()),
            added,
            runs: 0,
        })
    }

    /// Count another attempt for a backlog entry
    pub fn record_run(&self, id: i64) -> Result<bool, CatalogError> {
        let conn = self.connection()?;

        let changed = conn
            .execute("UPDATE backlogs SET runs = runs + 1 WHERE id = ?", [id])
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        Ok(changed > 0)
    }

    /// Drop a backlog entry
    pub fn remove_backlog(&self, id: i64) -> Result<bool, CatalogError> {
        let conn = self.connection()?;

        let changed = conn
            .execute("DELETE FROM backlogs WHERE id = ?", [id])
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        Ok(changed > 0)
    }

    /// All backlog entries, oldest first
    pub fn backlog(&self) -> Result<Vec<BacklogEntry>, CatalogError> {
        let conn = self.connection()?;

        let mut stmt = conn
            .prepare("SELECT id, path, expire, added, runs FROM backlogs ORDER BY id")
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(BacklogEntry {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    expire: Self::from_timestamp(row.get(2)?),
                    added: Self::from_timestamp(row.get(3)?),
                    runs: row.get::<_, i64>(4)? as u32,
                })
            })
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CatalogError::QueryFailed(e.to_string()))
    }
}
