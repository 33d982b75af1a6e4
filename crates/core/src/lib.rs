//! # Plume Core
//!
//! Domain types, traits, and error definitions for the Plume conversation
//! engine — the AI companion core of a blog platform. This crate has **zero
//! framework dependencies** — it defines the domain model that all other
//! crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod model;
pub mod persona;
pub mod prompt;
pub mod render;
pub mod session;
pub mod store;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{GlobalMemoryRecord, MemoryPage, Turn};
pub use message::{Message, Role};
pub use model::{ModelConfigChangeKind, ModelConfiguration, ModelProvider, ModelSettings};
pub use persona::{Persona, PersonaCard, PersonaId};
pub use prompt::{AssembledPrompt, BehaviorType, Prompt, PromptKind, PromptNamespace};
pub use render::TemplateRenderer;
pub use session::{
    MemorySpec, MemoryTier, RequestPlan, Session, SessionId, SessionMemoryPolicy, SessionMeta,
    SessionMode,
};
pub use store::{
    DurableStore, EphemeralTurnStore, FastStore, GlobalMemoryStore, ModelConfigStore,
    PersonaStore, PromptStore,
};
pub use transport::{InvokeOptions, ModelTransport};
