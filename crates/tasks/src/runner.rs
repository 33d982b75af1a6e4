//! The task runner — the shared template over all strategies.

use std::sync::Arc;
use tracing::{debug, info};

use plume_client::ClientCache;
use plume_core::error::{Error, TaskError};
use plume_core::persona::Persona;
use plume_core::transport::TextChunk;
use plume_prompt::PromptAssembler;

use crate::strategy::{TaskRequest, strategy_for};

/// A completed task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub strategy: &'static str,
    pub output: String,
}

pub struct TaskRunner {
    assembler: Arc<PromptAssembler>,
    clients: Arc<ClientCache>,
}

impl TaskRunner {
    pub fn new(assembler: Arc<PromptAssembler>, clients: Arc<ClientCache>) -> Self {
        Self { assembler, clients }
    }

    /// Run a task to completion: validate → extract input → resolve the
    /// task prompt → invoke the cached task client.
    pub async fn run(
        &self,
        request: &TaskRequest,
        persona: Option<&Persona>,
    ) -> Result<TaskOutcome, Error> {
        let (strategy_name, user_text) = self.prepare(request, persona).await?;

        let client = self.clients.task_client().await?;
        let output = client.run(&user_text).await.map_err(|e| match e {
            Error::Transport(t) => Error::Task(TaskError::ExecutionFailed {
                strategy: strategy_name.to_string(),
                reason: t.to_string(),
            }),
            other => other,
        })?;

        info!(strategy = strategy_name, chars = output.len(), "Task completed");
        Ok(TaskOutcome {
            strategy: strategy_name,
            output,
        })
    }

    /// Streaming variant. Any failure before the first chunk surfaces as an
    /// immediately-failed sequence rather than a chunk.
    pub async fn run_streaming(
        &self,
        request: &TaskRequest,
        persona: Option<&Persona>,
    ) -> tokio::sync::mpsc::Receiver<TextChunk> {
        let prepared = self.prepare(request, persona).await;

        let (strategy_name, user_text) = match prepared {
            Ok(parts) => parts,
            Err(e) => return failed_stream(e),
        };

        let client = match self.clients.task_client().await {
            Ok(client) => client,
            Err(e) => return failed_stream(e),
        };

        match client.run_streaming(&user_text).await {
            Ok(rx) => {
                debug!(strategy = strategy_name, "Task stream established");
                rx
            }
            Err(e) => failed_stream(e),
        }
    }

    async fn prepare(
        &self,
        request: &TaskRequest,
        persona: Option<&Persona>,
    ) -> Result<(&'static str, String), Error> {
        let strategy = strategy_for(request);
        let name = strategy.strategy_name();

        if !strategy.validate(request) {
            return Err(TaskError::InvalidRequest(format!(
                "request does not match strategy '{name}'"
            ))
            .into());
        }

        let input = strategy
            .extract_input(request)
            .ok_or_else(|| TaskError::EmptyInput(name.to_string()))?;

        let prompt = self.assembler.assemble_task(&input, request.code(), persona).await;

        // The task prompt leads; the extracted input is the single user turn.
        let user_text = if prompt.is_empty() {
            input
        } else {
            format!("{prompt}\n\n{input}")
        };
        Ok((name, user_text))
    }
}

/// A channel whose only item is the given failure.
fn failed_stream(error: Error) -> tokio::sync::mpsc::Receiver<TextChunk> {
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let transport_error = match error {
        Error::Transport(t) => t,
        other => plume_core::error::TransportError::NotConfigured(other.to_string()),
    };
    // Receiver is still held here, the send cannot fail meaningfully.
    let _ = tx.try_send(Err(transport_error));
    rx
}
