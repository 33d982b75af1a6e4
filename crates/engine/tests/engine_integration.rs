//! End-to-end engine tests over an in-memory SQLite store and a recording
//! transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use plume_client::TransportFactory;
use plume_config::AppConfig;
use plume_core::error::{Error, TransportError};
use plume_core::message::{Message, Role};
use plume_core::model::{ModelProvider, ModelSettings};
use plume_core::persona::{PersonaCard, PersonaId};
use plume_core::prompt::{Prompt, PromptKind};
use plume_core::session::SessionMode;
use plume_core::transport::{InvokeOptions, ModelTransport};
use plume_engine::{ChatEngine, EngineStores};
use plume_tasks::TaskRequest;

/// Transport that records every request and replies with a fixed string.
struct RecordingTransport {
    requests: Mutex<Vec<Vec<Message>>>,
    reply: String,
}

impl RecordingTransport {
    fn new(reply: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        }
    }

    fn last_request(&self) -> Vec<Message> {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ModelTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn invoke(
        &self,
        messages: &[Message],
        _options: &InvokeOptions,
    ) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

struct Harness {
    engine: Arc<ChatEngine>,
    transport: Arc<RecordingTransport>,
    persona_id: PersonaId,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

async fn harness() -> Harness {
    init_tracing();
    let transport = Arc::new(RecordingTransport::new("Here you go."));
    let factory: TransportFactory = {
        let transport = Arc::clone(&transport);
        Arc::new(move |_config| Ok(Arc::clone(&transport) as _))
    };

    let stores = EngineStores::sqlite("sqlite::memory:").await.unwrap();
    let engine =
        ChatEngine::with_transport_factory(AppConfig::default(), stores, factory).await;

    // Seed prompt fragments.
    for prompt in [
        Prompt::new(PromptKind::Global, "system.base", "You are a blog companion."),
        Prompt::new(PromptKind::Global, "behavior.chat", "Converse casually."),
        Prompt::new(PromptKind::Global, "behavior.task", "Complete the task directly."),
        Prompt::new(
            PromptKind::Template,
            "char.persona",
            "You are {{ char_name }}. {{ char_persona }}",
        ),
        Prompt::new(
            PromptKind::Template,
            "task.article_summary",
            "Summarize the following article in three sentences.",
        ),
    ] {
        engine.upsert_prompt(&prompt).await.unwrap();
    }

    // Seed persona and model configuration.
    let persona = engine
        .create_persona(
            "bartender",
            "Late night talk",
            PersonaCard {
                name: "Sable".into(),
                persona: "A dry-witted bartender.".into(),
                world: "A late-night bar below a bookshop.".into(),
                greeting: "What'll it be?".into(),
                example_dialogue: String::new(),
            },
        )
        .await
        .unwrap();

    let config = engine
        .create_model_config(
            ModelProvider {
                kind: "openai-compat".into(),
                base_url: "http://localhost:1".into(),
                api_key: String::new(),
                model: "test-model".into(),
            },
            ModelSettings::default(),
            "primary",
        )
        .await
        .unwrap();
    engine.enable_model_config(&config.id).await.unwrap();
    drain_events(&engine).await;

    Harness {
        engine,
        transport,
        persona_id: persona.id,
    }
}

/// Wait until every previously published event has been handled. The
/// coordinator processes events in order, so once a sentinel global-memory
/// change takes effect, everything before it has too.
async fn drain_events(engine: &Arc<ChatEngine>) {
    let sentinel = plume_core::memory::GlobalMemoryRecord::new("sentinel");
    engine.upsert_global_memory(&sentinel).await.unwrap();
    let e = Arc::clone(engine);
    wait_for(move || {
        let e = Arc::clone(&e);
        async move { e.pipeline().global_element().await.is_some() }
    })
    .await;

    engine.delete_global_memory(&sentinel.id).await.unwrap();
    let e = Arc::clone(engine);
    wait_for(move || {
        let e = Arc::clone(&e);
        async move { e.pipeline().global_element().await.is_none() }
    })
    .await;
}

/// Poll until `check` passes; the invalidation handlers run asynchronously.
async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

fn system_contents(messages: &[Message]) -> Vec<&str> {
    messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect()
}

#[tokio::test]
async fn owner_turn_composes_pipeline_in_priority_order() {
    let h = harness().await;

    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();

    let reply = h
        .engine
        .send_turn(session.id.as_str(), "What's on tap tonight?")
        .await
        .unwrap();
    assert_eq!(reply, "Here you go.");

    // First turn: no history yet, so no session-memory message. Global
    // memory is empty, so no global-memory element either.
    let request = h.transport.last_request();
    let system = system_contents(&request);
    assert_eq!(
        system,
        vec![
            "You are a blog companion.",
            "Converse casually.",
            "You are Sable. A dry-witted bartender.",
        ]
    );
    assert_eq!(request.last().unwrap().content, "What's on tap tonight?");

    // Second turn sees the recorded exchange as a session-memory message.
    h.engine
        .send_turn(session.id.as_str(), "And something stronger?")
        .await
        .unwrap();
    let request = h.transport.last_request();
    let system = system_contents(&request);
    assert_eq!(system.len(), 4);
    assert!(system[3].starts_with("[Recent Conversation]"));
    assert!(system[3].contains("What's on tap tonight?"));
    assert!(system[3].contains("Here you go."));
}

#[tokio::test]
async fn guest_turns_stay_in_the_ephemeral_tier() {
    let h = harness().await;

    let session = h
        .engine
        .start_session(false, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();
    assert!(session.id.is_guest());

    h.engine
        .send_turn(session.id.as_str(), "Hello there")
        .await
        .unwrap();

    let page = h
        .engine
        .page_memory(session.id.as_str(), None, 10)
        .await
        .unwrap();
    assert_eq!(page.turns.len(), 2);
    assert!(!page.has_more);

    // Guest sessions never reach the durable session list.
    let durable_sessions = h.engine.list_sessions(true).await.unwrap();
    assert!(durable_sessions.iter().all(|s| s.id != session.id));
}

#[tokio::test]
async fn turn_validation_failures_surface() {
    let h = harness().await;
    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();

    let err = h.engine.send_turn(session.id.as_str(), "   ").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let err = h.engine.send_turn("", "hello").await.unwrap_err();
    assert!(matches!(err, Error::Session(_)));

    let err = h
        .engine
        .start_session(true, &PersonaId::from("nobody"), SessionMode::Chat)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    // Broken template syntax is rejected at the admin boundary.
    let err = h
        .engine
        .upsert_prompt(&Prompt::new(PromptKind::Template, "char.world", "{% if"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn disable_leaves_no_enabled_config() {
    let h = harness().await;

    let configs = h.engine.list_model_configs().await.unwrap();
    let enabled = configs.iter().find(|c| c.enabled).unwrap();

    h.engine.disable_model_config(&enabled.id).await.unwrap();
    let configs = h.engine.list_model_configs().await.unwrap();
    assert!(configs.iter().all(|c| !c.enabled));

    // Idempotent.
    h.engine.disable_model_config(&enabled.id).await.unwrap();
}

#[tokio::test]
async fn streaming_turn_records_exchange_after_completion() {
    let h = harness().await;
    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();

    let mut rx = h
        .engine
        .send_turn_streaming(session.id.as_str(), "Pour me a story")
        .await
        .unwrap();

    let mut reply = String::new();
    while let Some(chunk) = rx.recv().await {
        reply.push_str(&chunk.unwrap());
    }
    assert_eq!(reply, "Here you go.");

    let session_id = session.id.clone();
    let engine = Arc::clone(&h.engine);
    wait_for(move || {
        let engine = Arc::clone(&engine);
        let session_id = session_id.clone();
        async move {
            engine
                .page_memory(session_id.as_str(), None, 10)
                .await
                .map(|page| page.turns.len() == 2)
                .unwrap_or(false)
        }
    })
    .await;
}

#[tokio::test]
async fn enabling_other_config_rebuilds_client_cache() {
    let h = harness().await;

    // Build a persona client.
    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();
    h.engine.send_turn(session.id.as_str(), "hi").await.unwrap();
    assert_eq!(h.engine.clients().persona_client_count().await, 1);

    let second = h
        .engine
        .create_model_config(
            ModelProvider {
                kind: "openai-compat".into(),
                base_url: "http://localhost:2".into(),
                api_key: String::new(),
                model: "other-model".into(),
            },
            ModelSettings::default(),
            "secondary",
        )
        .await
        .unwrap();
    h.engine.enable_model_config(&second.id).await.unwrap();

    // Exactly one configuration stays enabled.
    let configs = h.engine.list_model_configs().await.unwrap();
    let enabled: Vec<_> = configs.iter().filter(|c| c.enabled).collect();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, second.id);

    // The invalidation handler empties the persona-client map.
    let engine = Arc::clone(&h.engine);
    wait_for(move || {
        let engine = Arc::clone(&engine);
        async move { engine.clients().persona_client_count().await == 0 }
    })
    .await;

    // Next turn rebuilds lazily.
    h.engine.send_turn(session.id.as_str(), "again").await.unwrap();
    assert_eq!(h.engine.clients().persona_client_count().await, 1);
}

#[tokio::test]
async fn char_prompt_update_evicts_persona_caches() {
    let h = harness().await;
    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();
    h.engine.send_turn(session.id.as_str(), "hi").await.unwrap();
    assert!(h.engine.pipeline().persona_entry_count().await >= 1);

    h.engine
        .upsert_prompt(&Prompt::new(
            PromptKind::Template,
            "char.persona",
            "You are {{ char_name }}, rewritten. {{ char_persona }}",
        ))
        .await
        .unwrap();

    let engine = Arc::clone(&h.engine);
    wait_for(move || {
        let engine = Arc::clone(&engine);
        async move { engine.pipeline().persona_entry_count().await == 0 }
    })
    .await;

    // The next turn rebuilds the element set from the new template.
    h.engine.send_turn(session.id.as_str(), "still there?").await.unwrap();
    let request = h.transport.last_request();
    assert!(
        system_contents(&request)
            .iter()
            .any(|s| s.contains("rewritten"))
    );
}

#[tokio::test]
async fn global_memory_changes_flow_into_requests() {
    let h = harness().await;

    let record = plume_core::memory::GlobalMemoryRecord::new("The blog is about Rust.");
    h.engine.upsert_global_memory(&record).await.unwrap();

    let engine = Arc::clone(&h.engine);
    wait_for(move || {
        let engine = Arc::clone(&engine);
        async move { engine.pipeline().global_element().await.is_some() }
    })
    .await;

    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();
    h.engine.send_turn(session.id.as_str(), "hi").await.unwrap();

    let request = h.transport.last_request();
    assert!(
        system_contents(&request)
            .iter()
            .any(|s| s.contains("The blog is about Rust."))
    );

    // Deleting the record clears the element again.
    h.engine.delete_global_memory(&record.id).await.unwrap();
    let engine = Arc::clone(&h.engine);
    wait_for(move || {
        let engine = Arc::clone(&engine);
        async move { engine.pipeline().global_element().await.is_none() }
    })
    .await;
}

#[tokio::test]
async fn persona_update_evicts_only_that_persona() {
    let h = harness().await;

    let other = h
        .engine
        .create_persona(
            "librarian",
            "",
            PersonaCard {
                name: "Quill".into(),
                persona: "A meticulous librarian.".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let s1 = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap();
    let s2 = h
        .engine
        .start_session(true, &other.id, SessionMode::Chat)
        .await
        .unwrap();
    h.engine.send_turn(s1.id.as_str(), "hi").await.unwrap();
    h.engine.send_turn(s2.id.as_str(), "hi").await.unwrap();
    assert_eq!(h.engine.clients().persona_client_count().await, 2);

    h.engine
        .update_persona_card(
            &h.persona_id,
            PersonaCard {
                name: "Sable".into(),
                persona: "Even drier wit.".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let engine = Arc::clone(&h.engine);
    wait_for(move || {
        let engine = Arc::clone(&engine);
        async move { engine.clients().persona_client_count().await == 1 }
    })
    .await;
}

#[tokio::test]
async fn disabled_persona_rejects_new_sessions() {
    let h = harness().await;

    h.engine
        .set_persona_enabled(&h.persona_id, false)
        .await
        .unwrap();

    let err = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Chat)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn session_lifecycle_via_facade() {
    let h = harness().await;
    let session = h
        .engine
        .start_session(true, &h.persona_id, SessionMode::Agent)
        .await
        .unwrap();

    let archived = h.engine.archive_session(session.id.as_str()).await.unwrap();
    assert!(archived.archived);

    let listed = h.engine.list_sessions(false).await.unwrap();
    assert!(listed.iter().all(|s| s.id != session.id));

    let restored = h.engine.unarchive_session(session.id.as_str()).await.unwrap();
    assert!(!restored.archived);

    let toggled = h
        .engine
        .set_session_tools(session.id.as_str(), true)
        .await
        .unwrap();
    assert!(toggled.meta.tools_enabled);

    assert!(h.engine.delete_session(session.id.as_str()).await.unwrap());
    let err = h.engine.session_info(session.id.as_str()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn task_runs_with_fixed_pipeline() {
    let h = harness().await;

    let outcome = h
        .engine
        .run_task(
            &TaskRequest::ArticleSummary {
                title: "On Bars".into(),
                body: "A long article about bars.".into(),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.strategy, "article_summary");
    assert_eq!(outcome.output, "Here you go.");

    let request = h.transport.last_request();
    // Fixed task chain: the task behavior set (base system + task guide),
    // then the single user turn carrying prompt + input.
    assert_eq!(
        system_contents(&request),
        vec!["You are a blog companion.", "Complete the task directly."]
    );
    let user = request.last().unwrap();
    assert_eq!(user.role, Role::User);
    assert!(user.content.starts_with("Summarize the following article"));
    assert!(user.content.contains("A long article about bars."));
}

#[tokio::test]
async fn owner_sessions_survive_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = format!("sqlite://{}", dir.path().join("plume.db").display());

    let transport = Arc::new(RecordingTransport::new("ok"));
    let factory: TransportFactory = {
        let transport = Arc::clone(&transport);
        Arc::new(move |_config| Ok(Arc::clone(&transport) as _))
    };

    let session_id = {
        let stores = EngineStores::sqlite(&db).await.unwrap();
        let engine = ChatEngine::with_transport_factory(
            AppConfig::default(),
            stores,
            Arc::clone(&factory),
        )
        .await;
        let persona = engine
            .create_persona(
                "bartender",
                "",
                PersonaCard {
                    name: "Sable".into(),
                    persona: "Dry-witted.".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        engine
            .start_session(true, &persona.id, SessionMode::Chat)
            .await
            .unwrap()
            .id
    };

    // A fresh engine over the same database (new, empty fast store) must
    // find the session through the durable read path.
    let stores = EngineStores::sqlite(&db).await.unwrap();
    let engine = ChatEngine::with_transport_factory(AppConfig::default(), stores, factory).await;
    let found = engine.session_info(session_id.as_str()).await.unwrap();
    assert_eq!(found.id, session_id);
}

#[tokio::test]
async fn task_streaming_empty_input_fails_as_sequence() {
    let h = harness().await;

    let mut rx = h
        .engine
        .run_task_streaming(
            &TaskRequest::Companion {
                context: "   ".into(),
            },
            None,
        )
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    assert!(first.is_err());
}
