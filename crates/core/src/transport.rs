//! Model transport trait — the abstraction over the LLM endpoint.
//!
//! A transport takes a final ordered message list plus model parameters and
//! returns either a complete text completion or a stream of text chunks.
//! The request pipeline has already run by the time a transport is called.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::message::Message;
use crate::model::ModelConfiguration;

/// Parameters for one model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl InvokeOptions {
    /// Derive invocation options from a model configuration.
    pub fn from_config(config: &ModelConfiguration) -> Self {
        Self {
            model: config.provider.model.clone(),
            max_tokens: config.settings.max_tokens,
            temperature: config.settings.temperature,
            top_p: config.settings.top_p,
            frequency_penalty: config.settings.frequency_penalty,
            presence_penalty: config.settings.presence_penalty,
            stop: config.settings.stop.clone(),
        }
    }
}

/// A streamed chunk: text delta, or the end-of-stream marker.
pub type TextChunk = std::result::Result<String, TransportError>;

/// The model invocation contract.
///
/// Implementations: OpenAI-compatible HTTP endpoint, retrying wrapper,
/// in-memory stubs for tests.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// A human-readable name for this transport.
    fn name(&self) -> &str;

    /// Send a message list and get the complete completion text.
    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> std::result::Result<String, TransportError>;

    /// Send a message list and get a stream of text chunks. The stream is
    /// lazy, finite, and non-restartable; dropping the receiver cancels it.
    ///
    /// Default implementation calls `invoke()` and yields one chunk.
    async fn invoke_streaming(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> std::result::Result<tokio::sync::mpsc::Receiver<TextChunk>, TransportError> {
        let text = self.invoke(messages, options).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }
}
