//! Store traits — the abstraction over the relational and key/value
//! collaborators.
//!
//! The relational store holds personas, prompts, model configurations,
//! global memory, and durable conversation turns. The fast store is the
//! low-latency key/value tier used for session lookup and guest history.
//! Implementations live in `plume-store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::StoreError;
use crate::memory::{GlobalMemoryRecord, Turn};
use crate::model::ModelConfiguration;
use crate::persona::{Persona, PersonaId};
use crate::prompt::Prompt;
use crate::session::{Session, SessionId};

/// Persona persistence.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn find_by_id(&self, id: &PersonaId) -> Result<Option<Persona>, StoreError>;

    async fn exists_by_name(&self, name: &str) -> Result<bool, StoreError>;

    async fn list_enabled(&self) -> Result<Vec<Persona>, StoreError>;

    /// Insert or replace by id.
    async fn save(&self, persona: &Persona) -> Result<(), StoreError>;

    /// Physical removal. Returns whether a row was deleted.
    async fn delete(&self, id: &PersonaId) -> Result<bool, StoreError>;
}

/// Prompt fragment persistence, addressed by category key.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Look up an enabled prompt by its category key.
    async fn find_by_key_enabled(&self, category_key: &str) -> Result<Option<Prompt>, StoreError>;

    /// Insert or replace by category key (the unique addressing key).
    async fn save(&self, prompt: &Prompt) -> Result<(), StoreError>;
}

/// Model configuration persistence.
#[async_trait]
pub trait ModelConfigStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<ModelConfiguration>, StoreError>;

    /// The single currently-enabled configuration, if any.
    async fn find_enabled(&self) -> Result<Option<ModelConfiguration>, StoreError>;

    async fn list(&self) -> Result<Vec<ModelConfiguration>, StoreError>;

    async fn save(&self, config: &ModelConfiguration) -> Result<(), StoreError>;

    /// Enable one configuration and disable all others, atomically.
    async fn enable_exclusive(&self, id: &str) -> Result<(), StoreError>;
}

/// Operator-curated global memory.
#[async_trait]
pub trait GlobalMemoryStore: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<GlobalMemoryRecord>, StoreError>;

    async fn save(&self, record: &GlobalMemoryRecord) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// The low-latency key/value tier.
///
/// Durable-tier keys are stored without expiry; guest-tier keys carry a TTL.
#[async_trait]
pub trait FastStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Store a session. `ttl` of `None` means no expiry.
    async fn set(&self, session: &Session, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;

    async fn exists(&self, id: &SessionId) -> Result<bool, StoreError>;
}

/// Throwaway in-process turn history for ephemeral sessions.
///
/// Scoped to the process, not shared across nodes — ephemeral sessions are
/// not expected to survive a restart.
#[async_trait]
pub trait EphemeralTurnStore: Send + Sync {
    async fn append(&self, turn: &Turn) -> Result<(), StoreError>;

    /// The most recent `limit` turns in chronological order.
    async fn recent(&self, id: &SessionId, limit: usize) -> Result<Vec<Turn>, StoreError>;

    async fn clear(&self, id: &SessionId) -> Result<(), StoreError>;
}

/// The durable relational tier for sessions and conversation turns.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Append exactly one turn. History is never rewritten.
    async fn append_turn(&self, turn: &Turn) -> Result<(), StoreError>;

    /// The most recent `limit` turns strictly older than `cursor`
    /// (`None` = from the newest), newest first.
    async fn page_turns(
        &self,
        id: &SessionId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError>;

    /// The most recent `limit` turns in chronological order, for the
    /// session-memory window.
    async fn recent_turns(&self, id: &SessionId, limit: usize) -> Result<Vec<Turn>, StoreError>;

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    async fn list_sessions(&self, include_archived: bool) -> Result<Vec<Session>, StoreError>;

    /// Delete the session row and cascade to its memory turns.
    async fn delete_session_cascade(&self, id: &SessionId) -> Result<bool, StoreError>;
}
