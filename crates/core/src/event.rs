//! Domain event system — decoupled communication between bounded contexts.
//!
//! Events are published when a persona, prompt, global memory, or model
//! configuration changes. Invalidation handlers subscribe to evict or
//! rebuild caches without coupling to the mutating code path. Delivery is
//! best-effort, at-least-once from the subscriber's point of view: handlers
//! must be idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::model::ModelConfigChangeKind;
use crate::persona::PersonaId;

/// All domain events in the system. A closed enum dispatched by a single
/// match in the invalidation coordinator — no per-handler type filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    PersonaCreated {
        id: PersonaId,
        timestamp: DateTime<Utc>,
    },

    PersonaUpdated {
        id: PersonaId,
        timestamp: DateTime<Utc>,
    },

    PersonaDeleted {
        id: PersonaId,
        timestamp: DateTime<Utc>,
    },

    /// A prompt fragment changed. Consumers use the key's namespace prefix
    /// to decide invalidation scope.
    PromptUpdated {
        category_key: String,
        timestamp: DateTime<Utc>,
    },

    GlobalMemoryChanged {
        timestamp: DateTime<Utc>,
    },

    ModelConfigChanged {
        kind: ModelConfigChangeKind,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn persona_created(id: PersonaId) -> Self {
        Self::PersonaCreated {
            id,
            timestamp: Utc::now(),
        }
    }

    pub fn persona_updated(id: PersonaId) -> Self {
        Self::PersonaUpdated {
            id,
            timestamp: Utc::now(),
        }
    }

    pub fn persona_deleted(id: PersonaId) -> Self {
        Self::PersonaDeleted {
            id,
            timestamp: Utc::now(),
        }
    }

    pub fn prompt_updated(category_key: impl Into<String>) -> Self {
        Self::PromptUpdated {
            category_key: category_key.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn global_memory_changed() -> Self {
        Self::GlobalMemoryChanged {
            timestamp: Utc::now(),
        }
    }

    pub fn model_config_changed(kind: ModelConfigChangeKind) -> Self {
        Self::ModelConfigChanged {
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publication
/// happens after the triggering mutation commits; a lagged receiver drops
/// the oldest events, which is acceptable because every handler action is
/// an idempotent eviction or rebuild.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
