//! Model configuration — the provider binding and sampling settings shared
//! by every conversation client.
//!
//! Exactly one configuration may be enabled at a time; enabling one disables
//! all others (enforced by the config store). Mutations produce new values
//! and emit a typed change event so client caches can rebuild.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of field changed in a model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelConfigChangeKind {
    ProviderChanged,
    SettingsChanged,
    EnabledChanged,
}

/// Endpoint binding.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProvider {
    /// Provider kind tag (e.g. "openai-compat")
    pub kind: String,
    pub base_url: String,
    pub api_key: String,
    /// Model name sent with every request
    pub model: String,
}

impl std::fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

/// Sampling and call-shaping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default)]
    pub stop: Vec<String>,

    /// Whether streaming is preferred for conversational turns
    #[serde(default)]
    pub stream: bool,

    /// Per-attempt timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Additional attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    1.0
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop: Vec::new(),
            stream: false,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// A model configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub id: String,
    pub provider: ModelProvider,
    pub settings: ModelSettings,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelConfiguration {
    pub fn new(provider: ModelProvider, settings: ModelSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            provider,
            settings,
            enabled: false,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Produce an updated copy with a new provider binding.
    pub fn with_provider(&self, provider: ModelProvider) -> Self {
        let mut next = self.clone();
        next.provider = provider;
        next.updated_at = Utc::now();
        next
    }

    /// Produce an updated copy with new settings.
    pub fn with_settings(&self, settings: ModelSettings) -> Self {
        let mut next = self.clone();
        next.settings = settings;
        next.updated_at = Utc::now();
        next
    }

    /// Produce an updated copy with the enabled flag set.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        let mut next = self.clone();
        next.enabled = enabled;
        next.updated_at = Utc::now();
        next
    }

    /// Classify the difference against a prior version for event emission.
    pub fn change_kind(&self, previous: &Self) -> Option<ModelConfigChangeKind> {
        if self.provider != previous.provider {
            Some(ModelConfigChangeKind::ProviderChanged)
        } else if self.settings != previous.settings {
            Some(ModelConfigChangeKind::SettingsChanged)
        } else if self.enabled != previous.enabled {
            Some(ModelConfigChangeKind::EnabledChanged)
        } else {
            None
        }
    }
}
