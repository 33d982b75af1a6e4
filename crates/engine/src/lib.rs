//! The Plume engine — the upward-facing service facade and the
//! cache-invalidation handlers.
//!
//! `ChatEngine` wires every subsystem together and exposes the operations
//! the (out-of-scope) HTTP layer calls: session lifecycle, blocking and
//! streaming turns, paged memory, one-shot tasks, and the admin mutations
//! that persist and publish domain events. `InvalidationCoordinator`
//! subscribes to those events and keeps the pipeline and client caches
//! coherent.

pub mod engine;
pub mod invalidation;

pub use engine::{ChatEngine, EngineStores};
pub use invalidation::InvalidationCoordinator;
