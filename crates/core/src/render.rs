//! Template renderer contract.
//!
//! The template *language* is out of scope here — the core only cares that a
//! template string plus a context object produces text, and that syntax
//! errors are reported. The production implementation lives in
//! `plume-prompt`.

use crate::error::PromptError;

/// Compiles/caches template strings and renders them against a context.
pub trait TemplateRenderer: Send + Sync {
    /// Render a template against a context object.
    ///
    /// `key` is the template's addressing key, used for compile caching and
    /// error reporting.
    fn render(
        &self,
        key: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<String, PromptError>;

    /// Pre-compile a template under a key so later renders hit the cache.
    fn precompile(&self, key: &str, template: &str) -> Result<(), PromptError>;

    /// Whether the template parses.
    fn is_valid(&self, template: &str) -> bool;
}
