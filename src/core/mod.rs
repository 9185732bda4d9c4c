//! # Core Module
//!
//! The identification engine, independent of the CLI.
//!
//! ## Modules
//! - `hasher` - Computes ed2k content hashes
//! - `session` - Talks to the anime metadata service
//! - `record` - Decoded file records and status flags
//! - `plugin` - Hooks invoked as files move through the pipeline
//! - `pipeline` - The three-stage hash / lookup / action workflow
//! - `catalog` - SQLite bookkeeping of torrents and the retry backlog
//! - `watcher` - Reports new media files in watched folders

pub mod catalog;
pub mod hasher;
pub mod pipeline;
pub mod plugin;
pub mod record;
pub mod session;
pub mod watcher;

// Re-export commonly used types
pub use hasher::{ContentHash, ContentHasher, Ed2kHasher};
pub use pipeline::{Pipeline, PipelineState};
pub use plugin::{Plugin, PipelineContext};
pub use record::{AnimeFileRecord, FileState, HashResult, IdentificationResult};
pub use session::{Credentials, MetadataSession};
