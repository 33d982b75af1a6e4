//! Prompt rendering and assembly for Plume.
//!
//! This crate owns the production `TemplateRenderer` implementation
//! (minijinja with a compiled-template cache), the template context
//! projections, and the `PromptAssembler` that resolves a behavior type +
//! persona into the rendered fragment bundle the pipeline factory consumes.

pub mod assembler;
pub mod context;
pub mod renderer;

pub use assembler::PromptAssembler;
pub use context::{behavior_context, persona_context, task_context};
pub use renderer::JinjaRenderer;
