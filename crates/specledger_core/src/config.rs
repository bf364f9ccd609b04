//! Runtime configuration for storage and logging.
//!
//! # Responsibility
//! - Describe storage and logging options with serde defaults.
//! - Load options from a TOML file and validate them before use.
//!
//! # Invariants
//! - Every field has a default; an empty file is a valid configuration.
//! - `scan_batch_size` is never zero after `validate()`.

use crate::logging::{default_log_level, normalize_level};
use crate::repo::record_repo::DEFAULT_SCAN_BATCH_SIZE;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub storage: StorageOptions,
    pub logging: LoggingOptions,
}

/// Storage backend options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageOptions {
    /// SQLite file path. `None` selects an in-memory database.
    pub db_path: Option<PathBuf>,
    /// How long a connection waits on a locked database file.
    pub busy_timeout_ms: u64,
    /// Number of rows fetched per page by full scans.
    pub scan_batch_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

impl StorageOptions {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// File logging options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingOptions {
    pub level: String,
    /// Absolute directory for rolling log files. Logging stays off when unset.
    pub log_dir: Option<String>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

/// Configuration load/validation failures.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl LedgerConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.scan_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "storage.scan_batch_size must be at least 1".to_string(),
            ));
        }
        normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        Ok(())
    }
}
