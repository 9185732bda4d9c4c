//! # Error Module
//!
//! Error types for the anime file identifier.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, response codes, which stage failed
//! - **Separate fatal from per-item** - the pipeline decides which
//!   errors stop it and which are logged and skipped

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum IdentifierError {
    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while computing a content hash
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the remote metadata session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed ({code}): {message}")]
    Auth { code: u16, message: String },

    #[error("Unexpected response ({code}): {message}")]
    Protocol { code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Session is not connected. Call connect first.")]
    NotConnected,

    #[error("No response from {server} within {seconds}s")]
    Timeout { server: String, seconds: u64 },

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure raised by a plugin hook
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin {plugin} failed in {hook}: {reason}")]
    Failed {
        plugin: String,
        hook: &'static str,
        reason: String,
    },
}

/// Errors that stop a pipeline instance
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Failed to spawn {stage} worker: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("The {stage} stage stopped early, the pipeline can no longer accept files")]
    StageClosed { stage: &'static str },

    #[error("The {stage} worker panicked")]
    StagePanicked { stage: &'static str },

    #[error("Metadata session lock was poisoned by a previous failure")]
    SessionPoisoned,

    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),

    #[error("Plugin failed: {0}")]
    Plugin(#[from] PluginError),

    #[error("Session failed: {0}")]
    Session(#[from] SessionError),
}

/// Errors that occur with the catalog database
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to open catalog database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Catalog lock poisoned for {path}. Restart the tool and try again.")]
    Corrupted { path: PathBuf },
}

/// Errors that occur while watching folders
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    InitFailed(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Failed to watch {path}: {reason}")]
    WatchFailed { path: PathBuf, reason: String },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, IdentifierError>;
