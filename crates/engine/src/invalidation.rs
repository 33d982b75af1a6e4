//! Cache-invalidation event handlers.
//!
//! One coordinator subscribes to the domain-event bus and dispatches the
//! closed event enum with a single match — no per-handler type filtering.
//! Every action is an idempotent eviction or rebuild, so at-least-once
//! delivery and lagged receivers are safe. Failures stay at this boundary;
//! they never propagate into the operation that published the event.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use plume_client::ClientCache;
use plume_core::event::{DomainEvent, EventBus};
use plume_core::prompt::PromptNamespace;
use plume_pipeline::PipelineCacheManager;

pub struct InvalidationCoordinator {
    cache: Arc<PipelineCacheManager>,
    clients: Arc<ClientCache>,
}

impl InvalidationCoordinator {
    /// Subscribe to the bus and run until it closes.
    pub fn spawn(
        bus: &EventBus,
        cache: Arc<PipelineCacheManager>,
        clients: Arc<ClientCache>,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        let coordinator = Self { cache, clients };

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => coordinator.handle(&event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Events were dropped; we cannot know which caches
                        // they would have touched. Reset everything.
                        warn!(missed, "Invalidation events lost, clearing all caches");
                        coordinator.cache.clear_all().await;
                        coordinator.cache.rebuild_global_memory().await;
                        coordinator.clients.rebuild().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::PersonaCreated { id, .. } => {
                // Nothing cached yet; clients and elements build lazily.
                debug!(persona = %id, "Persona created");
            }

            DomainEvent::PersonaUpdated { id, .. } | DomainEvent::PersonaDeleted { id, .. } => {
                self.cache.remove_persona(id).await;
                self.clients.remove(id).await;
                debug!(persona = %id, "Persona caches evicted");
            }

            DomainEvent::PromptUpdated { category_key, .. } => {
                match PromptNamespace::of(category_key) {
                    PromptNamespace::Char => {
                        // Persona cards embed char.* renders; the clients'
                        // default pipelines were ensured against them.
                        self.cache.clear_personas().await;
                        self.clients.clear_personas().await;
                    }
                    PromptNamespace::System
                    | PromptNamespace::Behavior
                    | PromptNamespace::User => {
                        self.cache.clear_behaviors().await;
                        // The task client bakes the task behavior guide into
                        // its fixed chain.
                        self.clients.rebuild().await;
                    }
                    PromptNamespace::Task | PromptNamespace::Other => {
                        // task.* prompts are rendered per call.
                    }
                }
                debug!(key = %category_key, "Prompt caches invalidated");
            }

            DomainEvent::GlobalMemoryChanged { .. } => {
                self.cache.rebuild_global_memory().await;
                debug!("Global memory element rebuilt");
            }

            DomainEvent::ModelConfigChanged { kind, .. } => {
                self.clients.rebuild().await;
                debug!(?kind, "Model clients rebuilt");
            }
        }
    }
}
