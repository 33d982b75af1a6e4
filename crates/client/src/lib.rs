//! Model transport and the conversation-client cache for Plume.
//!
//! `EndpointTransport` speaks the OpenAI-compatible chat-completions
//! protocol; `RetryingTransport` bounds every call by the configured
//! per-attempt timeout and retry count. `ClientCache` holds one lazily-built
//! `ConversationClient` per persona plus the shared `TaskClient`, both
//! rebuilt wholesale when the model configuration changes.

pub mod cache;
pub mod conversation;
pub mod endpoint;
pub mod retry;

pub use cache::{ClientCache, TransportFactory};
pub use conversation::{ConversationClient, TaskClient};
pub use endpoint::EndpointTransport;
pub use retry::RetryingTransport;
