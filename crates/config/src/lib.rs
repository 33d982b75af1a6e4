//! Configuration loading, validation, and management for Plume.
//!
//! Loads configuration from `~/.plume/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.plume/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint (env override: PLUME_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model endpoint defaults used when no configuration row is enabled yet
    #[serde(default)]
    pub model: ModelDefaults,

    /// Session and memory settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Storage settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Domain event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Fallback model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Session lifecycle and memory window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// TTL for guest-tier fast-store entries, seconds
    #[serde(default = "default_guest_ttl_secs")]
    pub guest_ttl_secs: u64,

    /// How many recent turns the session-memory element carries
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Maximum page size for memory retrieval
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. `:memory:` for ephemeral (tests).
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_guest_ttl_secs() -> u64 {
    30 * 60
}
fn default_memory_window() -> usize {
    50
}
fn default_page_limit() -> usize {
    100
}
fn default_event_capacity() -> usize {
    256
}
fn default_database_path() -> String {
    "sqlite://plume.db".into()
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            guest_ttl_secs: default_guest_ttl_secs(),
            memory_window: default_memory_window(),
            page_limit: default_page_limit(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: ModelDefaults::default(),
            session: SessionConfig::default(),
            store: StoreConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("session", &self.session)
            .field("store", &self.store)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.plume/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `PLUME_API_KEY`
    /// - `PLUME_BASE_URL`
    /// - `PLUME_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PLUME_API_KEY").ok();
        }
        if let Ok(base_url) = std::env::var("PLUME_BASE_URL") {
            config.model.base_url = base_url;
        }
        if let Ok(model) = std::env::var("PLUME_MODEL") {
            config.model.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".plume")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.session.memory_window == 0 {
            return Err(ConfigError::ValidationError(
                "session.memory_window must be > 0".into(),
            ));
        }
        if self.session.page_limit == 0 {
            return Err(ConfigError::ValidationError(
                "session.page_limit must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration invalid: {0}")]
    ValidationError(String),
}
