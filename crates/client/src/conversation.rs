//! Conversation and task clients.
//!
//! A `ConversationClient` binds one model invocation target plus the
//! persona's default pipeline, assembled once at construction and served
//! from the pipeline caches per turn. A `TaskClient` carries the fixed
//! pipeline for one-shot background jobs.

use std::sync::Arc;
use tracing::info;

use plume_core::error::Error;
use plume_core::message::Message;
use plume_core::persona::Persona;
use plume_core::prompt::BehaviorType;
use plume_core::session::RequestPlan;
use plume_core::transport::{InvokeOptions, ModelTransport, TextChunk};
use plume_pipeline::{ElementFactory, PipelineCacheManager, PipelineComposer, PipelineElement, apply_chain};

/// One persona's bound conversation client.
pub struct ConversationClient {
    transport: Arc<dyn ModelTransport>,
    options: InvokeOptions,
    composer: Arc<PipelineComposer>,
    persona: Persona,
}

impl std::fmt::Debug for ConversationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationClient")
            .field("persona", &self.persona.id)
            .finish_non_exhaustive()
    }
}

impl ConversationClient {
    /// Bind a client to a persona, ensuring its default pipeline is cached.
    pub async fn build(
        persona: Persona,
        transport: Arc<dyn ModelTransport>,
        options: InvokeOptions,
        composer: Arc<PipelineComposer>,
    ) -> Self {
        composer.cache().ensure_persona(&persona).await;
        Self {
            transport,
            options,
            composer,
            persona,
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// One blocking turn: compose the chain, apply it to the user message,
    /// invoke the model.
    pub async fn send_turn(
        &self,
        plan: &RequestPlan,
        behavior: BehaviorType,
        user_text: &str,
    ) -> Result<String, Error> {
        let (messages, log_response) = self.prepare(plan, behavior, user_text).await?;
        let reply = self.transport.invoke(&messages, &self.options).await?;
        if log_response {
            info!(persona = %self.persona.id, chars = reply.len(), "Model response received");
        }
        Ok(reply)
    }

    /// One streaming turn. The receiver yields text chunks; dropping it
    /// cancels the stream downstream.
    pub async fn send_turn_streaming(
        &self,
        plan: &RequestPlan,
        behavior: BehaviorType,
        user_text: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<TextChunk>, Error> {
        let (messages, _) = self.prepare(plan, behavior, user_text).await?;
        Ok(self
            .transport
            .invoke_streaming(&messages, &self.options)
            .await?)
    }

    async fn prepare(
        &self,
        plan: &RequestPlan,
        behavior: BehaviorType,
        user_text: &str,
    ) -> Result<(Vec<Message>, bool), Error> {
        let chain = self.composer.compose(plan, behavior).await?;
        let mut messages = vec![Message::user(user_text)];
        let log_response = apply_chain(&chain, &mut messages);
        Ok((messages, log_response))
    }
}

/// The shared client for one-shot, non-conversational jobs.
pub struct TaskClient {
    transport: Arc<dyn ModelTransport>,
    options: InvokeOptions,
    /// Fixed chain: logging + the task behavior guide.
    chain: Vec<PipelineElement>,
}

impl TaskClient {
    pub async fn build(
        transport: Arc<dyn ModelTransport>,
        options: InvokeOptions,
        cache: &PipelineCacheManager,
    ) -> Self {
        let mut chain = vec![ElementFactory::logging_element()];
        chain.extend(cache.ensure_behavior(BehaviorType::Task).await.iter().cloned());
        chain.sort_by_key(|e| e.priority);
        Self {
            transport,
            options,
            chain,
        }
    }

    /// Run a one-shot job with the given text as the single user turn.
    pub async fn run(&self, user_text: &str) -> Result<String, Error> {
        let mut messages = vec![Message::user(user_text)];
        let log_response = apply_chain(&self.chain, &mut messages);
        let reply = self.transport.invoke(&messages, &self.options).await?;
        if log_response {
            info!(chars = reply.len(), "Task response received");
        }
        Ok(reply)
    }

    /// Streaming variant of [`run`](Self::run).
    pub async fn run_streaming(
        &self,
        user_text: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<TextChunk>, Error> {
        let mut messages = vec![Message::user(user_text)];
        apply_chain(&self.chain, &mut messages);
        Ok(self
            .transport
            .invoke_streaming(&messages, &self.options)
            .await?)
    }
}
