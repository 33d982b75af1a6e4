//! Store implementations for Plume.
//!
//! `SqliteStore` implements every relational collaborator trait (personas,
//! prompts, model configurations, global memory, sessions, durable turns)
//! over one SQLite database. `MemoryFastStore` is the in-process TTL
//! key/value tier; `ProcessTurnStore` holds throwaway guest history.

pub mod ephemeral;
pub mod fast;
pub mod sqlite;

pub use ephemeral::ProcessTurnStore;
pub use fast::MemoryFastStore;
pub use sqlite::SqliteStore;
