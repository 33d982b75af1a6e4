//! Model client cache.
//!
//! Two independent slots: a persona → `ConversationClient` map with
//! get-or-build semantics, and one `TaskClient` reference replaced whole.
//! Concurrent misses for the same persona may race to build, but the first
//! installed value wins and later builders adopt it — the map never holds
//! torn state. A model-configuration change clears the whole persona map
//! and replaces the task client, so no client keeps calling a stale
//! provider.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use plume_core::error::Error;
use plume_core::model::ModelConfiguration;
use plume_core::persona::PersonaId;
use plume_core::store::{ModelConfigStore, PersonaStore};
use plume_core::transport::{InvokeOptions, ModelTransport};
use plume_pipeline::PipelineComposer;

use crate::conversation::{ConversationClient, TaskClient};
use crate::endpoint::EndpointTransport;
use crate::retry::RetryingTransport;

/// Builds a transport for the given model configuration. The default factory
/// wraps an `EndpointTransport` in a `RetryingTransport`; tests swap in
/// stubs.
pub type TransportFactory =
    Arc<dyn Fn(&ModelConfiguration) -> Result<Arc<dyn ModelTransport>, Error> + Send + Sync>;

pub struct ClientCache {
    personas: Arc<dyn PersonaStore>,
    configs: Arc<dyn ModelConfigStore>,
    composer: Arc<PipelineComposer>,
    transport_factory: TransportFactory,

    clients: RwLock<HashMap<PersonaId, Arc<ConversationClient>>>,
    task_client: RwLock<Option<Arc<TaskClient>>>,
}

impl ClientCache {
    pub fn new(
        personas: Arc<dyn PersonaStore>,
        configs: Arc<dyn ModelConfigStore>,
        composer: Arc<PipelineComposer>,
    ) -> Self {
        Self::with_transport_factory(
            personas,
            configs,
            composer,
            Arc::new(Self::build_transport),
        )
    }

    pub fn with_transport_factory(
        personas: Arc<dyn PersonaStore>,
        configs: Arc<dyn ModelConfigStore>,
        composer: Arc<PipelineComposer>,
        transport_factory: TransportFactory,
    ) -> Self {
        Self {
            personas,
            configs,
            composer,
            transport_factory,
            clients: RwLock::new(HashMap::new()),
            task_client: RwLock::new(None),
        }
    }

    /// Get or lazily build the conversation client for a persona.
    pub async fn conversation_client(
        &self,
        persona_id: &PersonaId,
    ) -> Result<Arc<ConversationClient>, Error> {
        if let Some(client) = self.clients.read().await.get(persona_id) {
            return Ok(Arc::clone(client));
        }

        let persona = self
            .personas
            .find_by_id(persona_id)
            .await?
            .ok_or_else(|| Error::not_found("persona", persona_id.to_string()))?;
        if !persona.enabled {
            return Err(Error::validation(format!(
                "persona '{persona_id}' is disabled"
            )));
        }

        let config = self.enabled_config().await?;
        let transport = (self.transport_factory)(&config)?;
        let built = Arc::new(
            ConversationClient::build(
                persona,
                transport,
                InvokeOptions::from_config(&config),
                Arc::clone(&self.composer),
            )
            .await,
        );

        // First installed value wins; a concurrent builder adopts it.
        let mut clients = self.clients.write().await;
        let client = clients
            .entry(persona_id.clone())
            .or_insert_with(|| Arc::clone(&built));
        Ok(Arc::clone(client))
    }

    /// Get or lazily build the shared task client.
    pub async fn task_client(&self) -> Result<Arc<TaskClient>, Error> {
        if let Some(client) = self.task_client.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }

        let config = self.enabled_config().await?;
        let built = Arc::new(self.build_task_client(&config).await?);

        let mut slot = self.task_client.write().await;
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Rebuild on model-configuration change: drop every persona client and
    /// replace the task client against the new binding. Persona clients
    /// rebuild lazily on next use.
    pub async fn rebuild(&self) {
        self.clients.write().await.clear();

        let replacement = match self.enabled_config().await {
            Ok(config) => match self.build_task_client(&config).await {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Task client rebuild failed, deferring to next use");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "No enabled model configuration, task client cleared");
                None
            }
        };

        *self.task_client.write().await = replacement;
        info!("Model client cache rebuilt");
    }

    /// Number of cached persona clients (test/diagnostic aid).
    pub async fn persona_client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Evict a single persona's client.
    pub async fn remove(&self, persona_id: &PersonaId) {
        self.clients.write().await.remove(persona_id);
    }

    /// Evict every persona client, keeping the task client.
    pub async fn clear_personas(&self) {
        self.clients.write().await.clear();
    }

    async fn enabled_config(&self) -> Result<ModelConfiguration, Error> {
        self.configs
            .find_enabled()
            .await?
            .ok_or_else(|| Error::not_found("enabled model configuration", "<none>"))
    }

    async fn build_task_client(&self, config: &ModelConfiguration) -> Result<TaskClient, Error> {
        let transport = (self.transport_factory)(config)?;
        Ok(TaskClient::build(
            transport,
            InvokeOptions::from_config(config),
            self.composer.cache(),
        )
        .await)
    }

    fn build_transport(config: &ModelConfiguration) -> Result<Arc<dyn ModelTransport>, Error> {
        let endpoint = EndpointTransport::from_config(config)?;
        Ok(Arc::new(RetryingTransport::from_config(
            Arc::new(endpoint),
            config,
        )))
    }
}
