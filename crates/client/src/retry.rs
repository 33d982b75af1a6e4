//! Retrying transport wrapper — bounded attempts with per-attempt timeout.
//!
//! A call makes the first attempt plus up to `max_retries` more, each under
//! its own timeout. Exhausting the attempts surfaces the last underlying
//! error, never an indefinite block. For streaming, only stream
//! establishment is retried; once chunks flow, the stream is
//! non-restartable.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use plume_core::error::TransportError;
use plume_core::message::Message;
use plume_core::model::ModelConfiguration;
use plume_core::transport::{InvokeOptions, ModelTransport, TextChunk};

pub struct RetryingTransport {
    inner: Arc<dyn ModelTransport>,
    timeout: Duration,
    max_retries: u32,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn ModelTransport>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            inner,
            timeout,
            max_retries,
        }
    }

    /// Wrap a transport using a configuration's timeout and retry settings.
    pub fn from_config(inner: Arc<dyn ModelTransport>, config: &ModelConfiguration) -> Self {
        Self::new(
            inner,
            Duration::from_secs(config.settings.timeout_secs),
            config.settings.max_retries,
        )
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout(format!(
            "Transport '{}' timed out after {}s",
            self.inner.name(),
            self.timeout.as_secs()
        ))
    }
}

#[async_trait]
impl ModelTransport for RetryingTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<String, TransportError> {
        let attempts = self.max_retries + 1;
        let mut last_error = TransportError::NotConfigured("No attempts made".into());

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, self.inner.invoke(messages, options)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    warn!(
                        transport = %self.inner.name(),
                        attempt,
                        attempts,
                        error = %e,
                        "Model call failed"
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        transport = %self.inner.name(),
                        attempt,
                        attempts,
                        timeout_secs = self.timeout.as_secs(),
                        "Model call timed out"
                    );
                    last_error = self.timeout_error();
                }
            }
        }

        Err(last_error)
    }

    async fn invoke_streaming(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<TextChunk>, TransportError> {
        let attempts = self.max_retries + 1;
        let mut last_error = TransportError::NotConfigured("No attempts made".into());

        for attempt in 1..=attempts {
            match tokio::time::timeout(
                self.timeout,
                self.inner.invoke_streaming(messages, options),
            )
            .await
            {
                Ok(Ok(rx)) => return Ok(rx),
                Ok(Err(e)) => {
                    warn!(
                        transport = %self.inner.name(),
                        attempt,
                        attempts,
                        error = %e,
                        "Stream establishment failed"
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        transport = %self.inner.name(),
                        attempt,
                        attempts,
                        "Stream establishment timed out"
                    );
                    last_error = self.timeout_error();
                }
            }
        }

        Err(last_error)
    }
}
