//! The `ChatEngine` facade.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use plume_client::{ClientCache, TransportFactory};
use plume_config::AppConfig;
use plume_core::error::Error;
use plume_core::event::{DomainEvent, EventBus};
use plume_core::memory::{GlobalMemoryRecord, MemoryPage, Turn};
use plume_core::model::{ModelConfigChangeKind, ModelConfiguration, ModelProvider, ModelSettings};
use plume_core::persona::{Persona, PersonaCard, PersonaId};
use plume_core::prompt::{Prompt, PromptKind};
use plume_core::render::TemplateRenderer;
use plume_core::session::{RequestPlan, Session, SessionId, SessionMode};
use plume_core::store::{
    DurableStore, EphemeralTurnStore, FastStore, GlobalMemoryStore, ModelConfigStore,
    PersonaStore, PromptStore,
};
use plume_core::transport::TextChunk;
use plume_pipeline::{PipelineCacheManager, PipelineComposer};
use plume_prompt::{JinjaRenderer, PromptAssembler};
use plume_session::SessionService;
use plume_store::{MemoryFastStore, ProcessTurnStore, SqliteStore};
use plume_tasks::{TaskOutcome, TaskRequest, TaskRunner};

/// The collaborator stores the engine runs against.
pub struct EngineStores {
    pub personas: Arc<dyn PersonaStore>,
    pub prompts: Arc<dyn PromptStore>,
    pub model_configs: Arc<dyn ModelConfigStore>,
    pub global_memory: Arc<dyn GlobalMemoryStore>,
    pub fast: Arc<dyn FastStore>,
    pub durable: Arc<dyn DurableStore>,
    pub ephemeral: Arc<dyn EphemeralTurnStore>,
}

impl EngineStores {
    /// The default deployment: one SQLite database for every relational
    /// collaborator, in-process fast store and guest history.
    pub async fn sqlite(database_path: &str) -> Result<Self, Error> {
        let sqlite = Arc::new(SqliteStore::new(database_path).await?);
        Ok(Self {
            personas: Arc::clone(&sqlite) as Arc<dyn PersonaStore>,
            prompts: Arc::clone(&sqlite) as Arc<dyn PromptStore>,
            model_configs: Arc::clone(&sqlite) as Arc<dyn ModelConfigStore>,
            global_memory: Arc::clone(&sqlite) as Arc<dyn GlobalMemoryStore>,
            fast: Arc::new(MemoryFastStore::new()),
            durable: sqlite as Arc<dyn DurableStore>,
            ephemeral: Arc::new(ProcessTurnStore::new()),
        })
    }
}

/// The conversation engine: sessions, turns, tasks, admin mutations, and
/// the event-driven cache coherence behind them.
pub struct ChatEngine {
    config: AppConfig,
    bus: Arc<EventBus>,

    personas: Arc<dyn PersonaStore>,
    prompts: Arc<dyn PromptStore>,
    model_configs: Arc<dyn ModelConfigStore>,
    global_memory: Arc<dyn GlobalMemoryStore>,
    renderer: Arc<dyn TemplateRenderer>,

    sessions: Arc<SessionService>,
    pipeline: Arc<PipelineCacheManager>,
    clients: Arc<ClientCache>,
    tasks: TaskRunner,
}

impl ChatEngine {
    /// Wire the engine with the default transport (OpenAI-compatible
    /// endpoint behind the retrying wrapper).
    pub async fn new(config: AppConfig, stores: EngineStores) -> Arc<Self> {
        Self::build(config, stores, None).await
    }

    /// Wire the engine with a custom transport factory (tests, alternative
    /// providers).
    pub async fn with_transport_factory(
        config: AppConfig,
        stores: EngineStores,
        factory: TransportFactory,
    ) -> Arc<Self> {
        Self::build(config, stores, Some(factory)).await
    }

    async fn build(
        config: AppConfig,
        stores: EngineStores,
        factory: Option<TransportFactory>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new(config.event_capacity));

        let renderer: Arc<dyn TemplateRenderer> = Arc::new(JinjaRenderer::new());
        let assembler = Arc::new(PromptAssembler::new(
            Arc::clone(&stores.prompts),
            Arc::clone(&renderer),
        ));
        let pipeline = Arc::new(PipelineCacheManager::new(
            assembler.clone(),
            Arc::clone(&stores.global_memory),
        ));
        let composer = Arc::new(PipelineComposer::new(
            Arc::clone(&pipeline),
            Arc::clone(&stores.durable),
            Arc::clone(&stores.ephemeral),
        ));

        let clients = Arc::new(match factory {
            Some(factory) => ClientCache::with_transport_factory(
                Arc::clone(&stores.personas),
                Arc::clone(&stores.model_configs),
                Arc::clone(&composer),
                factory,
            ),
            None => ClientCache::new(
                Arc::clone(&stores.personas),
                Arc::clone(&stores.model_configs),
                Arc::clone(&composer),
            ),
        });

        let sessions = Arc::new(SessionService::new(
            Arc::clone(&stores.fast),
            Arc::clone(&stores.durable),
            Arc::clone(&stores.ephemeral),
            Duration::from_secs(config.session.guest_ttl_secs),
        ));

        let tasks = TaskRunner::new(Arc::clone(&assembler), Arc::clone(&clients));

        // Warm the global-memory element and start the invalidation loop.
        pipeline.rebuild_global_memory().await;
        crate::invalidation::InvalidationCoordinator::spawn(
            &bus,
            Arc::clone(&pipeline),
            Arc::clone(&clients),
        );

        Arc::new(Self {
            config,
            bus,
            personas: stores.personas,
            prompts: stores.prompts,
            model_configs: stores.model_configs,
            global_memory: stores.global_memory,
            renderer,
            sessions,
            pipeline,
            clients,
            tasks,
        })
    }

    /// The domain-event bus (for additional subscribers).
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The pipeline cache manager (diagnostics and tests).
    pub fn pipeline(&self) -> &Arc<PipelineCacheManager> {
        &self.pipeline
    }

    /// The model client cache (diagnostics and tests).
    pub fn clients(&self) -> &Arc<ClientCache> {
        &self.clients
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Start a session. Guests get the ephemeral tier, owners the durable
    /// one.
    pub async fn start_session(
        &self,
        owner: bool,
        persona_id: &PersonaId,
        mode: SessionMode,
    ) -> Result<Session, Error> {
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
        self.sessions.start(owner, persona.id, mode).await
    }

    pub async fn session_info(&self, raw_id: &str) -> Result<Session, Error> {
        let id = SessionId::parse(raw_id)?;
        self.sessions.require(&id).await
    }

    pub async fn list_sessions(&self, include_archived: bool) -> Result<Vec<Session>, Error> {
        self.sessions.list(include_archived).await
    }

    pub async fn archive_session(&self, raw_id: &str) -> Result<Session, Error> {
        let id = SessionId::parse(raw_id)?;
        self.sessions.archive(&id).await
    }

    pub async fn unarchive_session(&self, raw_id: &str) -> Result<Session, Error> {
        let id = SessionId::parse(raw_id)?;
        self.sessions.unarchive(&id).await
    }

    pub async fn delete_session(&self, raw_id: &str) -> Result<bool, Error> {
        let id = SessionId::parse(raw_id)?;
        self.sessions.delete(&id).await
    }

    pub async fn set_session_tools(&self, raw_id: &str, enabled: bool) -> Result<Session, Error> {
        let id = SessionId::parse(raw_id)?;
        self.sessions.set_tools(&id, enabled).await
    }

    pub async fn page_memory(
        &self,
        raw_id: &str,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<MemoryPage, Error> {
        let id = SessionId::parse(raw_id)?;
        let limit = limit.min(self.config.session.page_limit);
        self.sessions.page_memory(&id, cursor, limit).await
    }

    // ── Turns ─────────────────────────────────────────────────────────────

    /// One blocking turn on a session.
    pub async fn send_turn(&self, raw_id: &str, text: &str) -> Result<String, Error> {
        let (mut session, plan, text) = self.prepare_turn(raw_id, text).await?;

        let client = self
            .clients
            .conversation_client(&session.meta.persona_id)
            .await?;
        let reply = client.send_turn(&plan, session.behavior(), &text).await?;

        self.record_exchange(&mut session, &text, &reply).await;
        Ok(reply)
    }

    /// One streaming turn. The returned receiver yields reply chunks; the
    /// exchange is recorded once the stream completes.
    pub async fn send_turn_streaming(
        &self,
        raw_id: &str,
        text: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<TextChunk>, Error> {
        let (session, plan, text) = self.prepare_turn(raw_id, text).await?;

        let client = self
            .clients
            .conversation_client(&session.meta.persona_id)
            .await?;
        let mut upstream = client
            .send_turn_streaming(&plan, session.behavior(), &text)
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let mut session = session;
            let mut reply = String::new();
            let mut failed = false;

            while let Some(chunk) = upstream.recv().await {
                if let Ok(text) = &chunk {
                    reply.push_str(text);
                } else {
                    failed = true;
                }
                if tx.send(chunk).await.is_err() {
                    // Caller cancelled; upstream drops with us.
                    return;
                }
            }

            if !failed {
                record_exchange_inner(&sessions, &mut session, &text, &reply).await;
            }
        });

        Ok(rx)
    }

    async fn prepare_turn(
        &self,
        raw_id: &str,
        text: &str,
    ) -> Result<(Session, RequestPlan, String), Error> {
        if text.trim().is_empty() {
            return Err(Error::validation("user message must not be empty"));
        }
        let id = SessionId::parse(raw_id)?;
        let session = self.sessions.require(&id).await?;
        let plan = RequestPlan::for_session(&session, self.config.session.memory_window);
        Ok((session, plan, text.to_string()))
    }

    async fn record_exchange(&self, session: &mut Session, user_text: &str, reply: &str) {
        record_exchange_inner(&self.sessions, session, user_text, reply).await;
    }

    // ── Tasks ─────────────────────────────────────────────────────────────

    /// Run a one-shot task, optionally voiced by a persona.
    pub async fn run_task(
        &self,
        request: &TaskRequest,
        persona_id: Option<&PersonaId>,
    ) -> Result<TaskOutcome, Error> {
        let persona = self.load_task_persona(persona_id).await?;
        self.tasks.run(request, persona.as_ref()).await
    }

    /// Streaming task variant; pre-stream failures arrive as an
    /// immediately-failed sequence.
    pub async fn run_task_streaming(
        &self,
        request: &TaskRequest,
        persona_id: Option<&PersonaId>,
    ) -> Result<tokio::sync::mpsc::Receiver<TextChunk>, Error> {
        let persona = self.load_task_persona(persona_id).await?;
        Ok(self.tasks.run_streaming(request, persona.as_ref()).await)
    }

    async fn load_task_persona(
        &self,
        persona_id: Option<&PersonaId>,
    ) -> Result<Option<Persona>, Error> {
        match persona_id {
            Some(id) => {
                let persona = self
                    .personas
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| Error::not_found("persona", id.to_string()))?;
                Ok(Some(persona))
            }
            None => Ok(None),
        }
    }

    // ── Admin: personas ───────────────────────────────────────────────────

    pub async fn create_persona(
        &self,
        name: &str,
        description: &str,
        card: PersonaCard,
    ) -> Result<Persona, Error> {
        if self.personas.exists_by_name(name).await? {
            return Err(Error::validation(format!(
                "persona name '{name}' already exists"
            )));
        }
        let persona = Persona::create(name, description, card)?;
        self.personas.save(&persona).await?;
        self.bus.publish(DomainEvent::persona_created(persona.id.clone()));
        info!(persona = %persona.id, name, "Persona created");
        Ok(persona)
    }

    pub async fn update_persona_card(
        &self,
        id: &PersonaId,
        card: PersonaCard,
    ) -> Result<Persona, Error> {
        let persona = self.require_persona(id).await?;
        let updated = persona.with_card(card)?;
        self.personas.save(&updated).await?;
        self.bus.publish(DomainEvent::persona_updated(id.clone()));
        Ok(updated)
    }

    pub async fn update_persona_profile(
        &self,
        id: &PersonaId,
        name: &str,
        description: &str,
        cover: Option<String>,
    ) -> Result<Persona, Error> {
        let persona = self.require_persona(id).await?;
        let updated = persona.with_profile(name, description, cover)?;
        self.personas.save(&updated).await?;
        self.bus.publish(DomainEvent::persona_updated(id.clone()));
        Ok(updated)
    }

    pub async fn set_persona_enabled(
        &self,
        id: &PersonaId,
        enabled: bool,
    ) -> Result<Persona, Error> {
        let persona = self.require_persona(id).await?;
        let updated = persona.with_enabled(enabled);
        self.personas.save(&updated).await?;
        self.bus.publish(DomainEvent::persona_updated(id.clone()));
        Ok(updated)
    }

    /// Soft-delete, emit the deletion event, then physically remove.
    pub async fn delete_persona(&self, id: &PersonaId) -> Result<(), Error> {
        let persona = self.require_persona(id).await?;
        self.personas.save(&persona.mark_deleted()).await?;
        self.bus.publish(DomainEvent::persona_deleted(id.clone()));
        self.personas.delete(id).await?;
        info!(persona = %id, "Persona deleted");
        Ok(())
    }

    async fn require_persona(&self, id: &PersonaId) -> Result<Persona, Error> {
        self.personas
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("persona", id.to_string()))
    }

    // ── Admin: prompts ────────────────────────────────────────────────────

    pub async fn upsert_prompt(&self, prompt: &Prompt) -> Result<(), Error> {
        if prompt.kind == PromptKind::Template && !self.renderer.is_valid(&prompt.content) {
            return Err(Error::validation(format!(
                "template syntax invalid for '{}'",
                prompt.category_key
            )));
        }
        self.prompts.save(prompt).await?;
        self.bus
            .publish(DomainEvent::prompt_updated(prompt.category_key.clone()));
        Ok(())
    }

    // ── Admin: model configurations ───────────────────────────────────────

    pub async fn create_model_config(
        &self,
        provider: ModelProvider,
        settings: ModelSettings,
        description: &str,
    ) -> Result<ModelConfiguration, Error> {
        let mut config = ModelConfiguration::new(provider, settings);
        config.description = description.to_string();
        self.model_configs.save(&config).await?;
        Ok(config)
    }

    pub async fn update_model_config(
        &self,
        config: &ModelConfiguration,
    ) -> Result<ModelConfiguration, Error> {
        let previous = self
            .model_configs
            .find_by_id(&config.id)
            .await?
            .ok_or_else(|| Error::not_found("model configuration", config.id.clone()))?;

        self.model_configs.save(config).await?;

        if let Some(kind) = config.change_kind(&previous) {
            self.bus.publish(DomainEvent::model_config_changed(kind));
        }
        Ok(config.clone())
    }

    /// Enable one configuration, disabling every other, and rebuild the
    /// model clients against the new binding.
    pub async fn enable_model_config(&self, id: &str) -> Result<(), Error> {
        self.model_configs.enable_exclusive(id).await?;
        self.bus.publish(DomainEvent::model_config_changed(
            ModelConfigChangeKind::EnabledChanged,
        ));
        info!(config = id, "Model configuration enabled");
        Ok(())
    }

    /// Disable a configuration. No-op if it was already disabled.
    pub async fn disable_model_config(&self, id: &str) -> Result<(), Error> {
        let config = self
            .model_configs
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("model configuration", id.to_string()))?;
        if !config.enabled {
            return Ok(());
        }
        self.model_configs.save(&config.with_enabled(false)).await?;
        self.bus.publish(DomainEvent::model_config_changed(
            ModelConfigChangeKind::EnabledChanged,
        ));
        Ok(())
    }

    pub async fn list_model_configs(&self) -> Result<Vec<ModelConfiguration>, Error> {
        Ok(self.model_configs.list().await?)
    }

    // ── Admin: global memory ──────────────────────────────────────────────

    pub async fn upsert_global_memory(&self, record: &GlobalMemoryRecord) -> Result<(), Error> {
        self.global_memory.save(record).await?;
        self.bus.publish(DomainEvent::global_memory_changed());
        Ok(())
    }

    pub async fn delete_global_memory(&self, id: &str) -> Result<bool, Error> {
        let deleted = self.global_memory.delete(id).await?;
        if deleted {
            self.bus.publish(DomainEvent::global_memory_changed());
        }
        Ok(deleted)
    }
}

/// Persist both halves of an exchange, append-only. Failures are logged and
/// swallowed: the reply has already been produced and belongs to the caller.
async fn record_exchange_inner(
    sessions: &SessionService,
    session: &mut Session,
    user_text: &str,
    reply: &str,
) {
    let user_turn = Turn::user(session.id.clone(), user_text);
    if let Err(e) = sessions.record_turn(session, user_turn).await {
        warn!(session = %session.id, error = %e, "Failed to record user turn");
        return;
    }
    let assistant_turn = Turn::assistant(session.id.clone(), reply);
    if let Err(e) = sessions.record_turn(session, assistant_turn).await {
        warn!(session = %session.id, error = %e, "Failed to record assistant turn");
    }
}
