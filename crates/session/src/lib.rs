//! Session lifecycle and the tiered memory subsystem.

pub mod service;

pub use service::SessionService;
