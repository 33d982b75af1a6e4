//! MiniJinja-backed template renderer with a compiled-template cache.
//!
//! Templates are registered under their category key; a render with an
//! unchanged source hits the compiled cache, a changed source recompiles
//! and replaces the entry.

use minijinja::Environment;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use plume_core::error::PromptError;
use plume_core::render::TemplateRenderer;

/// The production template renderer.
pub struct JinjaRenderer {
    env: RwLock<Environment<'static>>,
    /// Registered sources, used to detect stale compiled entries.
    sources: RwLock<HashMap<String, String>>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Prompt fragments are plain text, not HTML.
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);
        Self {
            env: RwLock::new(env),
            sources: RwLock::new(HashMap::new()),
        }
    }

    fn is_cached(&self, key: &str, template: &str) -> bool {
        self.sources
            .read()
            .unwrap()
            .get(key)
            .is_some_and(|s| s == template)
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(
        &self,
        key: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<String, PromptError> {
        if !self.is_cached(key, template) {
            self.precompile(key, template)?;
        }

        let env = self.env.read().unwrap();
        let compiled = env.get_template(key).map_err(|e| PromptError::Render {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        compiled
            .render(minijinja::Value::from_serialize(context))
            .map_err(|e| PromptError::Render {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn precompile(&self, key: &str, template: &str) -> Result<(), PromptError> {
        let mut env = self.env.write().unwrap();
        env.add_template_owned(key.to_string(), template.to_string())
            .map_err(|e| PromptError::Syntax {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        self.sources
            .write()
            .unwrap()
            .insert(key.to_string(), template.to_string());
        debug!(key, "Template compiled");
        Ok(())
    }

    fn is_valid(&self, template: &str) -> bool {
        let mut probe = Environment::new();
        probe.add_template_owned("probe".to_string(), template.to_string()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_placeholders() {
        let renderer = JinjaRenderer::new();
        let out = renderer
            .render(
                "char.persona",
                "You are {{ char_name }}. {{ char_persona }}",
                &json!({"char_name": "Sable", "char_persona": "A bartender."}),
            )
            .unwrap();
        assert_eq!(out, "You are Sable. A bartender.");
    }

    #[test]
    fn recompiles_on_source_change() {
        let renderer = JinjaRenderer::new();
        let ctx = json!({"name": "x"});
        let v1 = renderer.render("k", "v1: {{ name }}", &ctx).unwrap();
        assert_eq!(v1, "v1: x");

        let v2 = renderer.render("k", "v2: {{ name }}", &ctx).unwrap();
        assert_eq!(v2, "v2: x");
    }

    #[test]
    fn syntax_error_reported() {
        let renderer = JinjaRenderer::new();
        let result = renderer.render("bad", "{% if %}", &json!({}));
        assert!(matches!(result, Err(PromptError::Syntax { .. })));
        assert!(!renderer.is_valid("{% if %}"));
        assert!(renderer.is_valid("plain text {{ ok }}"));
    }

    #[test]
    fn no_html_escaping() {
        let renderer = JinjaRenderer::new();
        let out = renderer
            .render("t", "{{ text }}", &json!({"text": "<world> & \"scenario\""}))
            .unwrap();
        assert_eq!(out, "<world> & \"scenario\"");
    }
}
