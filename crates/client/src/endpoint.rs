//! OpenAI-compatible endpoint transport.
//!
//! Works with any endpoint exposing `/v1/chat/completions`: OpenAI,
//! OpenRouter, Ollama, vLLM, and compatible proxies. Supports non-streaming
//! completions and streaming SSE.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use plume_core::error::TransportError;
use plume_core::message::Message;
use plume_core::model::ModelConfiguration;
use plume_core::transport::{InvokeOptions, ModelTransport, TextChunk};

/// An OpenAI-compatible model transport.
pub struct EndpointTransport {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl EndpointTransport {
    /// Create a transport from explicit parts.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create a transport bound to a model configuration's provider.
    pub fn from_config(config: &ModelConfiguration) -> Result<Self, TransportError> {
        Self::new(
            config.provider.kind.clone(),
            config.provider.base_url.clone(),
            config.provider.api_key.clone(),
            std::time::Duration::from_secs(config.settings.timeout_secs),
        )
    }

    fn request_body(
        messages: &[Message],
        options: &InvokeOptions,
        stream: bool,
    ) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": options.model,
            "messages": api_messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "top_p": options.top_p,
            "frequency_penalty": options.frequency_penalty,
            "presence_penalty": options.presence_penalty,
            "stream": stream,
        });

        if !options.stop.is_empty() {
            body["stop"] = serde_json::json!(options.stop);
        }

        body
    }

    fn status_error(status: u16, body: String) -> TransportError {
        if status == 429 {
            return TransportError::RateLimited { retry_after_secs: 5 };
        }
        if status == 401 || status == 403 {
            return TransportError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            );
        }
        warn!(status, body = %body, "Model endpoint returned error");
        TransportError::ApiError {
            status_code: status,
            message: body,
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiStreamChunk {
    choices: Vec<ApiStreamChoice>,
}

#[derive(Deserialize)]
struct ApiStreamChoice {
    delta: ApiDelta,
}

#[derive(Deserialize)]
struct ApiDelta {
    content: Option<String>,
}

#[async_trait]
impl ModelTransport for EndpointTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<String, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(messages, options, false);

        debug!(transport = %self.name, model = %options.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| TransportError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn invoke_streaming(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<TextChunk>, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(messages, options, true);

        debug!(transport = %self.name, model = %options.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and parse chunks. Dropping the receiver
        // closes the channel; the send failures below end the task, which
        // drops the byte stream and cancels the request downstream.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(TransportError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<ApiStreamChunk>(data) {
                        Ok(chunk) => {
                            let delta = chunk
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.clone());
                            if let Some(text) = delta {
                                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                    // Receiver dropped — caller cancelled.
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "Skipping unparseable SSE chunk");
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
