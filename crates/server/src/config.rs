//! Configuration management for the Lister server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/lister/config.toml`.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use listing::{Category, CategoryTable, HidingRules, ListingError, ScanConfig, SortOrder, VisibilityFilter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_requests_per_minute must be between 1 and 10000, got {0}")]
    InvalidMaxRequests(u32),

    #[error("rate_window_secs must be between 1 and 3600, got {0}")]
    InvalidRateWindow(u64),

    #[error("block_duration_secs must be between 1 and 86400, got {0}")]
    InvalidBlockDuration(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("invalid hiding pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid extension in [types]: {0:?}")]
    InvalidExtension(String),

    #[error("base_dir is not an existing directory: {0}")]
    InvalidBaseDir(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Main configuration structure for the Lister server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listener, paths and logging.
    pub server: ServerConfig,

    /// Sort order of listings.
    pub display: SortOrder,

    /// Which entries are never shown.
    pub hiding: HidingRules,

    /// Admission filter settings.
    pub security: SecurityConfig,

    /// Extension to category overrides, e.g. `log = "data"`.
    pub types: HashMap<String, Category>,
}

/// Listener, paths and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,

    /// Root directory to list.
    pub base_dir: PathBuf,

    /// Directory for admission state and the incident log.
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,

    /// Page title.
    pub title: String,
}

/// Admission filter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Run the admission filter in front of every route.
    pub enabled: bool,

    /// Requests allowed per IP within one rate window.
    pub max_requests_per_minute: u32,

    /// Length of the sliding window in seconds.
    pub rate_window_secs: u64,

    /// How long an IP stays blocked after exceeding the limit.
    pub block_duration_secs: u64,

    /// How many incidents `lister incidents` shows by default.
    pub recent_incidents: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.parse().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            base_dir: PathBuf::from("."),
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            log_dir: None,
            title: "Directory Listing".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: 30,
            rate_window_secs: 60,
            block_duration_secs: 300, // 5 minutes
            recent_incidents: 10,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lister")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lister")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - LISTER_BASE_DIR: Override the listed directory
    /// - LISTER_BIND: Override the listen address
    /// - LISTER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LISTER_BASE_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding base_dir from environment: {}", dir);
                self.server.base_dir = PathBuf::from(dir);
            }
        }

        if let Ok(bind) = std::env::var("LISTER_BIND") {
            if !bind.is_empty() {
                match bind.parse() {
                    Ok(addr) => {
                        tracing::info!("Overriding bind from environment: {}", bind);
                        self.server.bind = addr;
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring invalid LISTER_BIND {:?}: {}", bind, e);
                    }
                }
            }
        }

        if let Ok(level) = std::env::var("LISTER_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.server.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;
        if security.max_requests_per_minute < 1 || security.max_requests_per_minute > 10_000 {
            return Err(ConfigError::InvalidMaxRequests(security.max_requests_per_minute));
        }

        if security.rate_window_secs < 1 || security.rate_window_secs > 3600 {
            return Err(ConfigError::InvalidRateWindow(security.rate_window_secs));
        }

        if security.block_duration_secs < 1 || security.block_duration_secs > 86_400 {
            return Err(ConfigError::InvalidBlockDuration(security.block_duration_secs));
        }

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        for ext in self.types.keys() {
            let trimmed = ext.trim_start_matches('.');
            if trimmed.is_empty() || trimmed.contains('.') || trimmed.contains('/') {
                return Err(ConfigError::InvalidExtension(ext.clone()));
            }
        }

        if let Err(ListingError::InvalidPattern { pattern, reason }) = VisibilityFilter::new(&self.hiding) {
            return Err(ConfigError::InvalidPattern { pattern, reason });
        }

        if !self.server.base_dir.is_dir() {
            return Err(ConfigError::InvalidBaseDir(
                self.server.base_dir.display().to_string(),
            ));
        }

        Ok(())
    }

    /// Build the scanner configuration from the display, hiding and type
    /// sections.
    pub fn scan_config(&self) -> Result<ScanConfig> {
        ScanConfig::new(
            self.display.clone(),
            &self.hiding,
            CategoryTable::with_overrides(&self.types),
        )
        .context("Failed to compile hiding rules")
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
