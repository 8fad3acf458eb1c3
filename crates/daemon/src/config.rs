//! Configuration management for the Autoscene daemon.
//!
//! The configuration document is a TOML file, by default at
//! `~/.config/autoscene/config.toml`, edited externally by the user while
//! the daemon runs. Loading and validation are all-or-nothing: a document
//! either yields a fully valid [`Config`] or is rejected in its entirety.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("control.host must not be empty")]
    EmptyHost,

    #[error("control.port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("daemon.poll_interval_ms must be greater than 0")]
    InvalidPollInterval,

    #[error("daemon.config_check_interval_ms must be greater than 0")]
    InvalidCheckInterval,

    #[error("daemon.log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("mappings entry for {0:?} has an empty scene name")]
    EmptyScene(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Autoscene daemon.
///
/// A loaded `Config` is immutable: reloads replace the whole value, they
/// never mutate it in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Where and how to reach the control surface.
    pub control: ControlConfig,

    /// Daemon timing and logging.
    pub daemon: DaemonConfig,

    /// Focused-application identifier -> scene name. Exact, case-sensitive
    /// match against what the focus source reports.
    pub mappings: BTreeMap<String, String>,
}

/// Connection parameters for the control surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlConfig {
    /// Hostname or address of the control surface.
    pub host: String,

    /// WebSocket port of the control surface.
    pub port: u16,

    /// Shared password; empty when the surface has authentication disabled.
    pub password: String,
}

/// Daemon timing and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Focus sampling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Configuration document check interval in milliseconds. Independent
    /// of the poll interval so responsiveness and I/O cost tune separately.
    pub config_check_interval_ms: u64,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            daemon: DaemonConfig::default(),
            mappings: default_mappings(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: String::new(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            config_check_interval_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

fn default_mappings() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Emacs".to_string(), "editor".to_string()),
        ("Alacritty".to_string(), "terminal".to_string()),
        ("Chrome".to_string(), "browser".to_string()),
    ])
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoscene")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - AUTOSCENE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("AUTOSCENE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any value is outside its valid range. Callers
    /// must not install a snapshot that fails validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        if self.control.port == 0 {
            return Err(ConfigError::InvalidPort(self.control.port));
        }

        if self.daemon.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        if self.daemon.config_check_interval_ms == 0 {
            return Err(ConfigError::InvalidCheckInterval);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        for (app, scene) in &self.mappings {
            if scene.trim().is_empty() {
                return Err(ConfigError::EmptyScene(app.clone()));
            }
        }

        Ok(())
    }

    /// Focus sampling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.poll_interval_ms)
    }

    /// Configuration check interval as a [`Duration`].
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.config_check_interval_ms)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the built-in defaults. If the
    /// file exists but is invalid TOML, returns an error with a helpful
    /// message.
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

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
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
