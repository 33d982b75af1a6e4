//! Prompt assembly — resolving a behavior type + persona into the rendered
//! fragment bundle.
//!
//! Every slot degrades to an empty string on lookup or render failure. A
//! missing fragment must never abort a turn; it only reduces persona
//! fidelity. Failures are logged and swallowed here by design.

use std::sync::Arc;
use tracing::{debug, warn};

use plume_core::persona::Persona;
use plume_core::prompt::{AssembledPrompt, BehaviorType, PromptKind, keys};
use plume_core::render::TemplateRenderer;
use plume_core::store::PromptStore;

/// Resolves category keys against the prompt store and renders template
/// fragments. Stateless apart from its collaborators — create one and share.
pub struct PromptAssembler {
    prompts: Arc<dyn PromptStore>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl PromptAssembler {
    pub fn new(prompts: Arc<dyn PromptStore>, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { prompts, renderer }
    }

    /// Assemble the four prompt slots for one persona + behavior pairing.
    ///
    /// Composition order when flattened: base system → behavior guide →
    /// persona → user-address.
    pub async fn assemble(&self, persona: &Persona, behavior: BehaviorType) -> AssembledPrompt {
        let (base_system, behavior_guide) = self.assemble_behavior(behavior).await;
        let persona_card = self.assemble_persona_card(persona).await;
        let user_address = self
            .resolve_slot(keys::USER_ADDRESS, &crate::context::persona_context(persona))
            .await;

        AssembledPrompt {
            base_system,
            behavior_guide,
            persona_card,
            user_address,
        }
    }

    /// The behavior-level half of the bundle: rendered `system.base` and the
    /// behavior guide. Cached per behavior type, shared across personas.
    pub async fn assemble_behavior(&self, behavior: BehaviorType) -> (String, String) {
        let context = crate::context::behavior_context(behavior);
        let base_system = self.resolve_slot(keys::SYSTEM_BASE, &context).await;
        let behavior_guide = self.resolve_slot(behavior.category_key(), &context).await;
        (base_system, behavior_guide)
    }

    /// The persona half of the bundle: the rendered `char.*` card text.
    pub async fn assemble_persona_card(&self, persona: &Persona) -> String {
        let context = crate::context::persona_context(persona);
        self.resolve_persona_card(&context).await
    }

    /// Resolve one `task.*` prompt against a task-specific context.
    /// Returns an empty string on any failure, like the chat slots.
    pub async fn assemble_task(
        &self,
        input: &str,
        task_code: &str,
        persona: Option<&Persona>,
    ) -> String {
        let key = format!("task.{task_code}");
        let context = crate::context::task_context(input, task_code, persona);
        self.resolve_slot(&key, &context).await
    }

    /// The persona slot: the three `char.*` keys, blank-line joined,
    /// skipping empty fragments.
    async fn resolve_persona_card(&self, context: &serde_json::Value) -> String {
        let mut parts = Vec::new();
        for key in [keys::CHAR_PERSONA, keys::CHAR_WORLD, keys::CHAR_DIALOGUE] {
            let fragment = self.resolve_slot(key, context).await;
            if !fragment.trim().is_empty() {
                parts.push(fragment);
            }
        }
        parts.join("\n\n")
    }

    /// Look up an enabled prompt by key and render it if templated.
    /// Any failure degrades the slot to an empty string.
    async fn resolve_slot(&self, key: &str, context: &serde_json::Value) -> String {
        let prompt = match self.prompts.find_by_key_enabled(key).await {
            Ok(Some(prompt)) => prompt,
            Ok(None) => {
                debug!(key, "No enabled prompt for key, slot degraded to empty");
                return String::new();
            }
            Err(e) => {
                warn!(key, error = %e, "Prompt lookup failed, slot degraded to empty");
                return String::new();
            }
        };

        match prompt.kind {
            PromptKind::Global => prompt.content,
            PromptKind::Template => {
                match self.renderer.render(key, &prompt.content, context) {
                    Ok(rendered) => rendered,
                    Err(e) => {
                        warn!(key, error = %e, "Template render failed, slot degraded to empty");
                        String::new()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plume_core::error::StoreError;
    use plume_core::persona::PersonaCard;
    use plume_core::prompt::Prompt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory prompt store recording lookups.
    struct StubPromptStore {
        prompts: HashMap<String, Prompt>,
        lookups: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StubPromptStore {
        fn new(prompts: Vec<Prompt>) -> Self {
            Self {
                prompts: prompts
                    .into_iter()
                    .map(|p| (p.category_key.clone(), p))
                    .collect(),
                lookups: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                prompts: HashMap::new(),
                lookups: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl PromptStore for StubPromptStore {
        async fn find_by_key_enabled(
            &self,
            category_key: &str,
        ) -> Result<Option<Prompt>, StoreError> {
            self.lookups.lock().unwrap().push(category_key.to_string());
            if self.fail {
                return Err(StoreError::Storage("store down".into()));
            }
            Ok(self
                .prompts
                .get(category_key)
                .filter(|p| p.enabled)
                .cloned())
        }

        async fn save(&self, _prompt: &Prompt) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn test_persona() -> Persona {
        Persona::create(
            "bartender",
            "",
            PersonaCard {
                name: "Sable".into(),
                persona: "A dry-witted bartender.".into(),
                world: "A late-night bar.".into(),
                greeting: "What'll it be?".into(),
                example_dialogue: String::new(),
            },
        )
        .unwrap()
    }

    fn full_prompt_set() -> Vec<Prompt> {
        vec![
            Prompt::new(PromptKind::Global, "system.base", "You are an AI companion."),
            Prompt::new(PromptKind::Global, "behavior.chat", "Converse casually."),
            Prompt::new(
                PromptKind::Template,
                "char.persona",
                "You are {{ char_name }}. {{ char_persona }}",
            ),
            Prompt::new(PromptKind::Template, "char.world", "Scenario: {{ char_world }}"),
            Prompt::new(
                PromptKind::Template,
                "task.article_summary",
                "Summarize the following article.",
            ),
        ]
    }

    fn assembler(store: StubPromptStore) -> PromptAssembler {
        PromptAssembler::new(Arc::new(store), Arc::new(crate::JinjaRenderer::new()))
    }

    #[tokio::test]
    async fn assembles_all_slots() {
        let asm = assembler(StubPromptStore::new(full_prompt_set()));
        let result = asm.assemble(&test_persona(), BehaviorType::Chat).await;

        assert_eq!(result.base_system, "You are an AI companion.");
        assert_eq!(result.behavior_guide, "Converse casually.");
        assert!(result.persona_card.contains("You are Sable. A dry-witted bartender."));
        assert!(result.persona_card.contains("Scenario: A late-night bar."));
        // char.dialogue missing — joined without a trailing separator
        assert!(!result.persona_card.ends_with("\n\n"));
        // user.address missing — degraded to empty
        assert!(result.user_address.is_empty());
    }

    #[tokio::test]
    async fn persona_slot_nonempty_iff_card_has_persona_text() {
        let asm = assembler(StubPromptStore::new(full_prompt_set()));
        let result = asm.assemble(&test_persona(), BehaviorType::Chat).await;
        assert!(!result.persona_card.is_empty());
    }

    #[tokio::test]
    async fn store_failure_degrades_all_slots() {
        let asm = assembler(StubPromptStore::failing());
        let result = asm.assemble(&test_persona(), BehaviorType::Chat).await;
        assert_eq!(result, AssembledPrompt::default());
    }

    #[tokio::test]
    async fn render_failure_degrades_slot_only() {
        let mut prompts = full_prompt_set();
        prompts.push(Prompt::new(PromptKind::Template, "behavior.agent", "{% broken"));
        let asm = assembler(StubPromptStore::new(prompts));

        let result = asm.assemble(&test_persona(), BehaviorType::Agent).await;
        assert!(result.behavior_guide.is_empty());
        assert_eq!(result.base_system, "You are an AI companion.");
    }

    #[tokio::test]
    async fn flatten_orders_and_skips_empty() {
        let asm = assembler(StubPromptStore::new(full_prompt_set()));
        let result = asm.assemble(&test_persona(), BehaviorType::Chat).await;
        let flat = result.flatten();

        let base = flat.find("You are an AI companion.").unwrap();
        let behavior = flat.find("Converse casually.").unwrap();
        let persona = flat.find("You are Sable.").unwrap();
        assert!(base < behavior && behavior < persona);
    }

    #[tokio::test]
    async fn assemble_task_resolves_task_key() {
        let store = StubPromptStore::new(full_prompt_set());
        let asm = assembler(store);
        let prompt = asm
            .assemble_task("Body text", "article_summary", None)
            .await;
        assert_eq!(prompt, "Summarize the following article.");

        let missing = asm.assemble_task("x", "nonexistent", None).await;
        assert!(missing.is_empty());
    }
}
