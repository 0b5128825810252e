//! Configuration management for the index lifecycle tool.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (`INDEX_LIFECYCLE__ENGINE__URL=...`). The result is an immutable
//! value handed to each component; nothing reads configuration globally.

use crate::utils::errors::{LifecycleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "INDEX_LIFECYCLE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the search engine REST API
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout in seconds for whole-index reindex and bulk replay requests
    #[serde(default = "default_bulk_timeout_secs")]
    pub bulk_timeout_secs: u64,
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Cache directory; archives live in `<cache_dir>/backup`
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Archive filename prefix
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Number of automatic backups to keep (0 disables rotation)
    #[serde(default)]
    pub rotate: usize,

    /// Documents per search page during export
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Point-in-time lease used while exporting
    #[serde(default = "default_pit_keep_alive")]
    pub pit_keep_alive: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Path to the JSON index schema resource
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,

    /// Prefix turning a logical index name into a physical one
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_engine_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_bulk_timeout_secs() -> u64 {
    3600
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/cache")
}

fn default_archive_prefix() -> String {
    "ta_backup".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_pit_keep_alive() -> String {
    "1m".to_string()
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config/index_mapping.json")
}

fn default_index_prefix() -> String {
    "ta_".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            bulk_timeout_secs: default_bulk_timeout_secs(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            archive_prefix: default_archive_prefix(),
            rotate: 0,
            page_size: default_page_size(),
            pit_keep_alive: default_pit_keep_alive(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
            index_prefix: default_index_prefix(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            backup: BackupConfig::default(),
            schema: SchemaConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply `.env` and
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| LifecycleError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| LifecycleError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.url.trim().is_empty() {
            return Err(LifecycleError::Config("engine.url must not be empty".into()));
        }
        if self.engine.timeout_secs == 0 || self.engine.bulk_timeout_secs == 0 {
            return Err(LifecycleError::Config("engine timeouts must be at least 1 second".into()));
        }
        if self.backup.page_size == 0 {
            return Err(LifecycleError::Config("backup.page_size must be at least 1".into()));
        }
        if self.backup.archive_prefix.is_empty() || self.backup.archive_prefix.contains(['/', '\\']) {
            return Err(LifecycleError::Config(format!(
                "backup.archive_prefix {:?} is not a valid file name prefix",
                self.backup.archive_prefix
            )));
        }
        Ok(())
    }

    /// Directory holding archives and transient export files.
    pub fn backup_dir(&self) -> PathBuf {
        self.backup.cache_dir.join("backup")
    }
}
