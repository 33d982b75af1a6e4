//! Error types for the Plume domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! The taxonomy follows three propagation classes:
//! - Validation and not-found failures surface directly to the caller.
//! - Prompt/assembly failures are normally *degraded* (empty slot, logged)
//!   rather than propagated — they exist as typed errors only for the few
//!   callers that need to distinguish them.
//! - `PipelineError::CacheInconsistency` is a programming error and is
//!   always loud.

use thiserror::Error;

/// The top-level error type for all Plume operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Prompt rendering / assembly ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Pipeline composition ---
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // --- Session lifecycle ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Storage ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Model transport ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- One-shot tasks ---
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    // --- Bad input from the caller ---
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // --- Unknown entity ---
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a not-found failure.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum PromptError {
    #[error("Template syntax error in '{key}': {message}")]
    Syntax { key: String, message: String },

    #[error("Template render failed for '{key}': {message}")]
    Render { key: String, message: String },

    #[error("No enabled prompt for category key: {0}")]
    MissingKey(String),
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Persona elements were read before `ensure` populated them.
    /// This is a programming error in the composition path — there is no
    /// silent fallback because a request without persona grounding would
    /// serve a broken conversation.
    #[error("Cache inconsistency: persona '{persona_id}' elements requested before ensure")]
    CacheInconsistency { persona_id: String },

    #[error("Element construction failed: {0}")]
    ElementConstruction(String),
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Malformed session id: {0:?}")]
    MalformedId(String),

    #[error("Session configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("Session is archived: {0}")]
    Archived(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Transport not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("Task input empty for strategy '{0}'")]
    EmptyInput(String),

    #[error("Task request invalid: {0}")]
    InvalidRequest(String),

    #[error("Task execution failed for '{strategy}': {reason}")]
    ExecutionFailed { strategy: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_displays_correctly() {
        let err = Error::Transport(TransportError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn cache_inconsistency_names_persona() {
        let err = Error::Pipeline(PipelineError::CacheInconsistency {
            persona_id: "bartender".into(),
        });
        assert!(err.to_string().contains("bartender"));
        assert!(err.to_string().contains("before ensure"));
    }

    #[test]
    fn not_found_shorthand() {
        let err = Error::not_found("persona", "p-123");
        assert!(err.to_string().contains("persona"));
        assert!(err.to_string().contains("p-123"));
    }
}
