//! Request pipeline for Plume — the advisor chain applied to every outgoing
//! model request.
//!
//! A pipeline is an ordered list of named elements. Injection elements add
//! one system message each; the logging element observes the composed
//! request and the final response. Element sets are cached per behavior type
//! and per persona, invalidated by domain events.

pub mod cache;
pub mod composer;
pub mod element;
pub mod factory;

pub use cache::PipelineCacheManager;
pub use composer::PipelineComposer;
pub use element::{ElementAction, PipelineElement, apply_chain, priority};
pub use factory::ElementFactory;
