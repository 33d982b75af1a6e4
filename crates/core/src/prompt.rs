//! Prompt fragments and their addressing scheme.
//!
//! Prompts are named, keyed fragments persisted by the prompt store. The
//! `category_key` is the addressing key: a stable dotted string such as
//! `system.base`, `behavior.chat`, `char.persona`, `task.article_summary`.
//! The key's namespace prefix decides invalidation scope when a prompt is
//! edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two prompt kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Contains `{{placeholder}}` markers and needs rendering.
    Template,
    /// Used verbatim.
    Global,
}

/// A persisted prompt fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub kind: PromptKind,

    /// Stable dotted addressing key, unique across prompts.
    pub category_key: String,

    /// Raw content; placeholders only if `kind` is Template.
    pub content: String,

    pub enabled: bool,

    #[serde(default)]
    pub description: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(kind: PromptKind, category_key: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            category_key: category_key.into(),
            content: content.into(),
            enabled: true,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Produce an updated copy with new content.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.content = content.into();
        next.updated_at = Utc::now();
        next
    }

    /// The namespace this prompt's key belongs to.
    pub fn namespace(&self) -> PromptNamespace {
        PromptNamespace::of(&self.category_key)
    }
}

/// Category-key namespaces. Invalidation consumers switch on this: `char.*`
/// edits touch persona-derived caches, the rest touch behavior-level caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptNamespace {
    System,
    Behavior,
    User,
    Task,
    Char,
    Other,
}

impl PromptNamespace {
    /// Parse the namespace prefix of a category key.
    pub fn of(category_key: &str) -> Self {
        match category_key.split('.').next() {
            Some("system") => Self::System,
            Some("behavior") => Self::Behavior,
            Some("user") => Self::User,
            Some("task") => Self::Task,
            Some("char") => Self::Char,
            _ => Self::Other,
        }
    }
}

/// Well-known category keys.
pub mod keys {
    pub const SYSTEM_BASE: &str = "system.base";
    pub const USER_ADDRESS: &str = "user.address";
    pub const CHAR_PERSONA: &str = "char.persona";
    pub const CHAR_WORLD: &str = "char.world";
    pub const CHAR_DIALOGUE: &str = "char.dialogue";
    pub const TASK_ARTICLE_SUMMARY: &str = "task.article_summary";
    pub const TASK_COMPANION: &str = "task.companion";
    pub const TASK_CONGRATULATION: &str = "task.congratulation";
}

/// The coarse mode selector choosing which guidance template applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorType {
    Chat,
    Task,
    Agent,
}

impl BehaviorType {
    /// The category key of this behavior's guidance template.
    pub fn category_key(&self) -> &'static str {
        match self {
            BehaviorType::Chat => "behavior.chat",
            BehaviorType::Task => "behavior.task",
            BehaviorType::Agent => "behavior.agent",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorType::Chat => "chat",
            BehaviorType::Task => "task",
            BehaviorType::Agent => "agent",
        }
    }
}

impl std::fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rendered prompt bundle for one persona + behavior pairing.
///
/// Ephemeral — rebuilt on every cache miss, never persisted. Empty slots mean
/// the fragment was missing or failed to render (a degraded result, not an
/// error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledPrompt {
    /// Rendered `system.base`
    pub base_system: String,
    /// Rendered `behavior.*` guide
    pub behavior_guide: String,
    /// Rendered `char.*` keys joined with blank lines
    pub persona_card: String,
    /// Rendered `user.address` (currently unused downstream)
    pub user_address: String,
}

impl AssembledPrompt {
    /// Flatten to one string for logging or fallback use: base system →
    /// behavior guide → persona → user-address, blank-line separated,
    /// skipping empty slots.
    pub fn flatten(&self) -> String {
        [
            &self.base_system,
            &self.behavior_guide,
            &self.persona_card,
            &self.user_address,
        ]
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}
