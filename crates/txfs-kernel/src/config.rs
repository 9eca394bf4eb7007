//! Configuration.
//!
//! Every field has a default, so an empty document (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! [lock]
//! extension = ".lock"
//! timeout_ms = 0
//! retry_interval_ms = 100
//! max_retry_interval_ms = 1000
//! backoff_multiplier = 1.0
//! stale_threshold_ms = 0
//!
//! [fs]
//! default_file_mode = 0o644
//! default_dir_mode = 0o755
//!
//! [watch]
//! enabled = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TxfsConfig {
    pub lock: LockConfig,
    pub fs: FsConfig,
    pub watch: WatchConfig,
}

/// Lock acquisition defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Suffix appended to a target path to form its lock path.
    pub extension: String,
    /// Total wait budget; 0 means fail immediately when held.
    pub timeout_ms: u64,
    /// First sleep between attempts.
    pub retry_interval_ms: u64,
    /// Cap for the growing sleep.
    pub max_retry_interval_ms: u64,
    /// Factor applied to the sleep after each attempt; 1.0 disables backoff.
    pub backoff_multiplier: f64,
    /// Age after which a held lock may be superseded; 0 disables.
    pub stale_threshold_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            extension: ".lock".to_string(),
            timeout_ms: 0,
            retry_interval_ms: 100,
            max_retry_interval_ms: 1000,
            backoff_multiplier: 1.0,
            stale_threshold_ms: 0,
        }
    }
}

/// Filesystem defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FsConfig {
    pub default_file_mode: u32,
    pub default_dir_mode: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            default_file_mode: 0o644,
            default_dir_mode: 0o755,
        }
    }
}

/// Watch manager switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// When false, watchers can be registered but receive nothing.
    pub enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl TxfsConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: TxfsConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded txfs config");
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lock = &self.lock;
        if lock.extension.is_empty() {
            return Err(ConfigError::InvalidValue("lock.extension must not be empty".into()));
        }
        if lock.extension.contains('/') {
            return Err(ConfigError::InvalidValue(format!(
                "lock.extension must not contain '/': {:?}",
                lock.extension
            )));
        }
        if !(lock.backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "lock.backoff_multiplier must be >= 1.0, got {}",
                lock.backoff_multiplier
            )));
        }
        if lock.max_retry_interval_ms < lock.retry_interval_ms {
            return Err(ConfigError::InvalidValue(format!(
                "lock.max_retry_interval_ms ({}) is below lock.retry_interval_ms ({})",
                lock.max_retry_interval_ms, lock.retry_interval_ms
            )));
        }
        for (name, mode) in [
            ("fs.default_file_mode", self.fs.default_file_mode),
            ("fs.default_dir_mode", self.fs.default_dir_mode),
        ] {
            if mode > 0o7777 {
                return Err(ConfigError::InvalidValue(format!("{name} out of range: {mode:#o}")));
            }
        }
        Ok(())
    }
}
