//! Session aggregate, memory tiers, and the per-turn request plan.
//!
//! A session id carries a `guest:` prefix discriminator that decides the
//! storage tier: guest sessions live only in the fast store under a TTL,
//! owner sessions are dual-stored with the durable store as the system of
//! record across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::persona::PersonaId;

/// Prefix marking ephemeral guest sessions.
const GUEST_PREFIX: &str = "guest:";

/// Unique identifier for a session. Equality is value equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// New durable (owner) session id.
    pub fn owner() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// New ephemeral (guest) session id.
    pub fn guest() -> Self {
        Self(format!("{GUEST_PREFIX}{}", Uuid::new_v4()))
    }

    /// Parse an id supplied by a caller. Rejects empty/whitespace ids.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        if raw.trim().is_empty() {
            return Err(SessionError::MalformedId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Whether this id names a guest-tier session.
    pub fn is_guest(&self) -> bool {
        self.0.starts_with(GUEST_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Chat,
    Agent,
}

/// Where a session's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMemoryPolicy {
    /// Fast store only, TTL-bounded. No durable rows ever.
    SessionOnly,
    /// Durable rows, no TTL; fast-store entry kept as a read-through cache.
    Persistent,
}

impl SessionMemoryPolicy {
    /// The policy mandated by ownership: guests are ephemeral, owners durable.
    pub fn for_ownership(owner: bool) -> Self {
        if owner {
            Self::Persistent
        } else {
            Self::SessionOnly
        }
    }
}

/// Session configuration fixed at creation (mode, persona, flags).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub persona_id: PersonaId,
    pub mode: SessionMode,
    pub owner: bool,
    pub memory_policy: SessionMemoryPolicy,
    #[serde(default)]
    pub tools_enabled: bool,
    #[serde(default)]
    pub rag_enabled: bool,
}

/// A session aggregate: created → active ⇄ archived → deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub meta: SessionMeta,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub archived: bool,
}

impl Session {
    /// Start a new session. The memory policy is chosen by ownership, and the
    /// id discriminator must agree with it.
    pub fn start(
        owner: bool,
        persona_id: PersonaId,
        mode: SessionMode,
    ) -> Result<Self, SessionError> {
        if persona_id.as_str().trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "session must reference a persona".into(),
            ));
        }
        let id = if owner {
            SessionId::owner()
        } else {
            SessionId::guest()
        };
        let now = Utc::now();
        Ok(Self {
            id,
            meta: SessionMeta {
                persona_id,
                mode,
                owner,
                memory_policy: SessionMemoryPolicy::for_ownership(owner),
                tools_enabled: false,
                rag_enabled: false,
            },
            created_at: now,
            last_active_at: now,
            archived: false,
        })
    }

    /// Bump the activity timestamp. No-op while archived.
    pub fn touch(&mut self) {
        if !self.archived {
            self.last_active_at = Utc::now();
        }
    }

    pub fn archive(&mut self) {
        self.archived = true;
    }

    pub fn unarchive(&mut self) {
        self.archived = false;
    }

    /// The behavior type this session's turns compose with.
    pub fn behavior(&self) -> crate::prompt::BehaviorType {
        match self.meta.mode {
            SessionMode::Chat => crate::prompt::BehaviorType::Chat,
            SessionMode::Agent => crate::prompt::BehaviorType::Agent,
        }
    }
}

/// Memory tier selector for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Ephemeral,
    Durable,
}

/// Tier plus history window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySpec {
    pub tier: MemoryTier,
    pub window: usize,
}

/// Per-turn composition input. Computed fresh each turn from the current
/// session and the caller's identity — never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPlan {
    pub session_id: SessionId,
    pub memory: MemorySpec,
    pub tools_enabled: bool,
    pub persona_id: PersonaId,
}

impl RequestPlan {
    /// Derive the plan for one turn on the given session.
    pub fn for_session(session: &Session, window: usize) -> Self {
        let tier = match session.meta.memory_policy {
            SessionMemoryPolicy::SessionOnly => MemoryTier::Ephemeral,
            SessionMemoryPolicy::Persistent => MemoryTier::Durable,
        };
        Self {
            session_id: session.id.clone(),
            memory: MemorySpec { tier, window },
            tools_enabled: session.meta.tools_enabled,
            persona_id: session.meta.persona_id.clone(),
        }
    }
}
