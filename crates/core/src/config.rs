//! Configuration management for Folio.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/folio/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("dir_mode must be an octal permission between 0o100 and 0o777, got {0:#o}")]
    InvalidDirMode(u32),

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("page_limit ({page}) must not exceed max_page_limit ({max})")]
    PageLimitAboveMax { page: usize, max: usize },

    #[error("upload_dir must not be empty")]
    EmptyUploadDir,

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Upload root and directory creation.
    pub storage: StorageConfig,

    /// Where the JSON documents live.
    pub meta: MetaConfig,

    /// Grant seeding behavior.
    pub acl: AclConfig,

    /// Traversal cost bounds.
    pub traversal: TraversalConfig,

    /// Logging.
    pub log: LogConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory all folder keys resolve under.
    pub upload_dir: PathBuf,

    /// Permission bits for directories created by `mkdir`.
    pub dir_mode: u32,
}

/// Meta document configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetaConfig {
    /// Directory holding grants, owners, encryption markers and metadata caches.
    pub dir: PathBuf,
}

/// Grant configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AclConfig {
    /// Copy the parent's owners/read/write/share into new folders.
    pub inherit_on_create: bool,
}

/// Traversal limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraversalConfig {
    /// Depth of the locked-descendant probe.
    pub probe_depth: usize,

    /// Entries one probe may inspect before giving up.
    pub probe_scan_limit: usize,

    /// Entries a single-level count inspects.
    pub count_scan_cap: usize,

    /// Default entry budget for deep counts.
    pub deep_scan_limit: usize,

    /// Default page size for child listings.
    pub page_limit: usize,

    /// Largest page size a caller may request.
    pub max_page_limit: usize,

    /// Folders returned by the flat folder list.
    pub folder_list_limit: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_data_dir().join("uploads"),
            dir_mode: 0o755,
        }
    }
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir().join("meta"),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            probe_depth: 2,
            probe_scan_limit: 2000,
            count_scan_cap: 4000,
            deep_scan_limit: 20_000,
            page_limit: 100,
            max_page_limit: 1000,
            folder_list_limit: 10_000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn check_range(name: &'static str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FOLIO_UPLOAD_DIR: Override the upload root
    /// - FOLIO_META_DIR: Override the meta directory
    /// - FOLIO_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - ACL_INHERIT_ON_CREATE: Override grant inheritance (true/false/1/0)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FOLIO_UPLOAD_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding upload_dir from environment: {}", dir);
                self.storage.upload_dir = PathBuf::from(dir);
            }
        }

        if let Ok(dir) = std::env::var("FOLIO_META_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding meta dir from environment: {}", dir);
                self.meta.dir = PathBuf::from(dir);
            }
        }

        if let Ok(level) = std::env::var("FOLIO_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.log.level = level;
            }
        }

        if let Ok(raw) = std::env::var("ACL_INHERIT_ON_CREATE") {
            match parse_bool(&raw) {
                Some(inherit) => {
                    tracing::info!("Overriding inherit_on_create from environment: {}", inherit);
                    self.acl.inherit_on_create = inherit;
                }
                None if raw.is_empty() => {}
                None => tracing::warn!("Ignoring unparseable ACL_INHERIT_ON_CREATE={:?}", raw),
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyUploadDir);
        }

        if !(0o100..=0o777).contains(&self.storage.dir_mode) {
            return Err(ConfigError::InvalidDirMode(self.storage.dir_mode));
        }

        let t = &self.traversal;
        check_range("probe_depth", t.probe_depth, 0, 16)?;
        check_range("probe_scan_limit", t.probe_scan_limit, 1, 1_000_000)?;
        check_range("count_scan_cap", t.count_scan_cap, 1, 1_000_000)?;
        check_range("deep_scan_limit", t.deep_scan_limit, 1, 10_000_000)?;
        check_range("page_limit", t.page_limit, 1, 100_000)?;
        check_range("max_page_limit", t.max_page_limit, 1, 100_000)?;
        check_range("folder_list_limit", t.folder_list_limit, 1, 1_000_000)?;
        if t.page_limit > t.max_page_limit {
            return Err(ConfigError::PageLimitAboveMax {
                page: t.page_limit,
                max: t.max_page_limit,
            });
        }

        let level = self.log.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log.level.clone()));
        }

        Ok(())
    }

    /// Path of the grant document.
    pub fn grants_path(&self) -> PathBuf {
        self.meta.dir.join("folder_acl.json")
    }

    /// Path of the ownership document.
    pub fn owners_path(&self) -> PathBuf {
        self.meta.dir.join("folder_owners.json")
    }

    /// Path of the encryption marker document.
    pub fn encryption_path(&self) -> PathBuf {
        self.meta.dir.join("encrypted_folders.json")
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
