//! # Configuration
//!
//! Settings are read from a TOML file, either the one passed with
//! `--config` or `<config_dir>/anime-identifier/config.toml`. A missing
//! default file is not an error; every field has a default.
//!
//! ```toml
//! [anidb]
//! username = "someone"
//! password = "secret"
//!
//! [pipeline]
//! test_mode = true
//! rename_pattern = "{anime} - {episode} [{group_short}].{ext}"
//! ```

use crate::core::pipeline::HashFailurePolicy;
use crate::core::plugin::{RenameConfig, DEFAULT_RENAME_PATTERN};
use crate::core::session::{AniDbConfig, Credentials};
use crate::error::{IdentifierError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APP_DIR: &str = "anime-identifier";

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub anidb: AniDbSection,
    pub logging: LoggingSection,
    pub pipeline: PipelineSection,
    pub database: DatabaseSection,
}

/// `[anidb]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AniDbSection {
    pub server: String,
    pub port: u16,
    pub local_port: u16,
    pub username: String,
    pub password: String,
    pub nat: bool,
    pub timeout_secs: u64,
    pub client: String,
    pub client_version: u32,
}

impl Default for AniDbSection {
    fn default() -> Self {
        let session = AniDbConfig::default();
        Self {
            server: session.server,
            port: session.port,
            local_port: session.local_port,
            username: String::new(),
            password: String::new(),
            nat: false,
            timeout_secs: session.timeout.as_secs(),
            client: session.client,
            client_version: session.client_version,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Log what the plugins would do without touching files
    pub test_mode: bool,
    /// Skip unreadable files instead of stopping
    pub skip_unreadable: bool,
    pub rename_pattern: String,
    pub destination: Option<PathBuf>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            test_mode: false,
            skip_unreadable: false,
            rename_pattern: DEFAULT_RENAME_PATTERN.to_string(),
            destination: None,
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Catalog location, see [`AppConfig::database_path`]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Load from an explicit path, or from the default location if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default),
                _ => {
                    debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IdentifierError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| IdentifierError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse config text
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn session_config(&self) -> AniDbConfig {
        AniDbConfig {
            server: self.anidb.server.clone(),
            port: self.anidb.port,
            local_port: self.anidb.local_port,
            timeout: Duration::from_secs(self.anidb.timeout_secs),
            client: self.anidb.client.clone(),
            client_version: self.anidb.client_version,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.anidb.username.clone(),
            password: self.anidb.password.clone(),
            nat: self.anidb.nat,
        }
    }

    pub fn rename_config(&self) -> RenameConfig {
        RenameConfig {
            pattern: self.pipeline.rename_pattern.clone(),
            destination: self.pipeline.destination.clone(),
        }
    }

    pub fn hash_failure_policy(&self) -> HashFailurePolicy {
        if self.pipeline.skip_unreadable {
            HashFailurePolicy::Skip
        } else {
            HashFailurePolicy::Abort
        }
    }

    /// Catalog location, defaulting to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("catalog.db")
        })
    }
}
