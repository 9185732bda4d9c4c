//! Trait definitions for content hashing.

use crate::error::HashError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size and digest of a file's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    /// File size in bytes
    pub size: u64,
    /// Lowercase hexadecimal digest
    pub hash: String,
}

impl ContentHash {
    /// Create a new content hash
    pub fn new(size: u64, hash: impl Into<String>) -> Self {
        Self {
            size,
            hash: hash.into(),
        }
    }
}

/// Computes the content hash of a file on disk.
///
/// Implementations are stateless so the hash stage can run them
/// without touching the metadata session.
pub trait ContentHasher: Send + Sync {
    /// Hash the file at `path`
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError>;
}

impl<F> ContentHasher for F
where
    F: Fn(&Path) -> Result<ContentHash, HashError> + Send + Sync,
{
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        self(path)
    }
}
