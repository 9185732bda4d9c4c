//! # Catalog Module
//!
//! Bookkeeping for the download side: torrents that were fetched and
//! paths waiting to be retried (the backlog).
//!
//! The pipeline never reads or writes the catalog; it is maintained by
//! the `db` CLI commands and by whatever feeds files into the pipeline.

mod sqlite;

pub use sqlite::SqliteCatalog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A downloaded torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Torrent {
    pub id: i64,
    /// Info-hash as reported by the torrent client
    pub hash_string: String,
    pub name: String,
    /// Whether the payload was copied out for identification
    pub copied: bool,
}

/// A path waiting for another identification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogEntry {
    pub id: i64,
    pub path: PathBuf,
    /// Give up on the entry after this time
    pub expire: DateTime<Utc>,
    pub added: DateTime<Utc>,
    /// Attempts made so far
    pub runs: u32,
}

impl BacklogEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire <= now
    }
}
