//! Conversation memory records and paging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Role;
use crate::session::SessionId;

/// One stored conversation turn. Appends are one row per message; history is
/// never re-inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, content)
    }

    pub fn assistant(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Assistant, content)
    }

    fn new(session_id: SessionId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// One page of memory, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPage {
    pub turns: Vec<Turn>,
    /// Whether older turns exist past this page.
    pub has_more: bool,
    /// Cursor for the next page: the oldest returned timestamp.
    pub next_cursor: Option<DateTime<Utc>>,
}

impl MemoryPage {
    pub fn empty() -> Self {
        Self {
            turns: Vec::new(),
            has_more: false,
            next_cursor: None,
        }
    }
}

/// An operator-curated fact injected into every conversation regardless of
/// persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMemoryRecord {
    pub id: String,
    pub content: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GlobalMemoryRecord {
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}
