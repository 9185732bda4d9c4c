//! # Session Module
//!
//! The stateful conversation with the remote metadata service.
//!
//! A session is one authenticated login: it cannot interleave queries,
//! so callers must serialize access (the pipeline keeps it behind a
//! single mutex held by the lookup stage).
//!
//! ## Backends
//! - `AniDbSession` - AniDB UDP API
//! - `InMemorySession` - For testing and offline use

mod anidb;
mod fields;
mod memory;

pub use anidb::{AniDbConfig, AniDbSession};
pub use fields::{
    anime_mask, anime_response_order, file_mask, file_response_order, AnimeField, FileField,
};
pub use memory::{InMemorySession, SessionActivity};

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Login details for the remote service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Ask the server to report our public address (behind NAT)
    pub nat: bool,
}

/// A single file lookup
#[derive(Debug, Clone)]
pub struct LookupQuery<'a> {
    /// Base name of the file, for logging on the remote side
    pub name: &'a str,
    pub size: u64,
    pub hash: &'a str,
    pub file_fields: &'a [FileField],
    pub anime_fields: &'a [AnimeField],
}

/// Undecoded columns returned for a matched file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFileRecord {
    pub file_id: u64,
    pub file: HashMap<FileField, String>,
    pub anime: HashMap<AnimeField, String>,
}

impl RawFileRecord {
    /// Create an empty record for `file_id`
    pub fn new(file_id: u64) -> Self {
        Self {
            file_id,
            ..Default::default()
        }
    }

    /// Builder-style setter for a file column
    pub fn with_file(mut self, field: FileField, value: impl Into<String>) -> Self {
        self.file.insert(field, value.into());
        self
    }

    /// Builder-style setter for an anime column
    pub fn with_anime(mut self, field: AnimeField, value: impl Into<String>) -> Self {
        self.anime.insert(field, value.into());
        self
    }

    /// Value of a file column, empty if not returned
    pub fn file_value(&self, field: FileField) -> &str {
        self.file.get(&field).map(String::as_str).unwrap_or("")
    }

    /// Value of an anime column, empty if not returned
    pub fn anime_value(&self, field: AnimeField) -> &str {
        self.anime.get(&field).map(String::as_str).unwrap_or("")
    }
}

/// The remote metadata capability consumed by the pipeline.
///
/// Not `Sync`: one caller at a time.
pub trait MetadataSession: Send {
    /// Open the connection and authenticate
    fn connect(&mut self, credentials: &Credentials) -> Result<(), SessionError>;

    /// Look up a file by size and hash.
    ///
    /// Returns `Ok(None)` when the service has no such file.
    fn lookup(&mut self, query: &LookupQuery<'_>) -> Result<Option<RawFileRecord>, SessionError>;

    /// End the session
    fn logout(&mut self) -> Result<(), SessionError>;
}

impl<S: MetadataSession + ?Sized> MetadataSession for Box<S> {
    fn connect(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        (**self).connect(credentials)
    }

    fn lookup(&mut self, query: &LookupQuery<'_>) -> Result<Option<RawFileRecord>, SessionError> {
        (**self).lookup(query)
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        (**self).logout()
    }
}
