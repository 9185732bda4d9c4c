//! # Anime Identifier
//!
//! Identifies anime video files by their ed2k hash against AniDB and
//! hands the results to plugins (renaming, reporting).
//!
//! ## Architecture
//! - `core` - The hash / lookup / action pipeline and its parts
//! - `events` - Event-driven progress reporting
//! - `error` - Error types
//! - `config` - TOML configuration

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{IdentifierError, Result};

/// Initialize tracing for the library
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (for example
/// `"info"` or `"anime_identifier=debug"`) is used. Calling it twice is
/// harmless.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
