//! Pipeline element factory — turns rendered fragments and memory records
//! into ordered elements.
//!
//! Slots whose rendered text is empty or whitespace-only produce no element.
//! An empty global-memory list produces no element, never an element with
//! empty content.

use plume_core::memory::{GlobalMemoryRecord, Turn};
use plume_core::prompt::AssembledPrompt;

use crate::element::{ElementAction, PipelineElement, priority};

pub struct ElementFactory;

impl ElementFactory {
    /// The behavior-level elements: system-prompt + behavior-guide.
    pub fn behavior_elements(base_system: &str, behavior_guide: &str) -> Vec<PipelineElement> {
        let mut elements = Vec::new();
        if !base_system.trim().is_empty() {
            elements.push(PipelineElement::inject(
                "system-prompt",
                priority::SYSTEM,
                base_system,
            ));
        }
        if !behavior_guide.trim().is_empty() {
            elements.push(PipelineElement::inject(
                "behavior-guide",
                priority::BEHAVIOR,
                behavior_guide,
            ));
        }
        elements
    }

    /// The persona-card element set (zero or one element).
    pub fn persona_elements(persona_card: &str) -> Vec<PipelineElement> {
        if persona_card.trim().is_empty() {
            return Vec::new();
        }
        vec![PipelineElement::inject(
            "persona-card",
            priority::PERSONA,
            persona_card,
        )]
    }

    /// Up to three injection elements from a full assembled bundle.
    pub fn prompt_elements(assembled: &AssembledPrompt) -> Vec<PipelineElement> {
        let mut elements =
            Self::behavior_elements(&assembled.base_system, &assembled.behavior_guide);
        elements.extend(Self::persona_elements(&assembled.persona_card));
        elements
    }

    /// At most one combined global-memory element.
    pub fn global_memory_element(records: &[GlobalMemoryRecord]) -> Option<PipelineElement> {
        let combined = records
            .iter()
            .filter(|r| r.enabled && !r.content.trim().is_empty())
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if combined.is_empty() {
            return None;
        }
        Some(PipelineElement::inject(
            "global-memory",
            priority::MEMORY,
            combined,
        ))
    }

    /// Exactly one session-memory element from a history window, or none
    /// when the window is empty.
    pub fn session_memory_element(turns: &[Turn]) -> Option<PipelineElement> {
        if turns.is_empty() {
            return None;
        }
        let mut content = String::from("[Recent Conversation]\n");
        for turn in turns {
            content.push_str(turn.role.as_str());
            content.push_str(": ");
            content.push_str(&turn.content);
            content.push('\n');
        }
        Some(PipelineElement::inject(
            "session-memory",
            priority::MEMORY,
            content,
        ))
    }

    /// The request-logging element included in every chain.
    pub fn logging_element() -> PipelineElement {
        PipelineElement {
            name: "request-logging",
            priority: priority::LOGGING,
            action: ElementAction::LogRequest,
        }
    }
}
