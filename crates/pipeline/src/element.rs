//! Pipeline elements — named, ordered message-injection units.
//!
//! Lower priority applies earlier. The logging element (priority 0) leads
//! the sorted chain as the outermost observer; injection elements follow in
//! band order. Ties break by insertion order — the chain applier relies on
//! a stable sort.

use tracing::{debug, info};

use plume_core::message::{Message, Role};

/// Fixed priority bands. Lower applies earlier in the chain.
pub mod priority {
    pub const LOGGING: i32 = 0;
    pub const SYSTEM: i32 = 100;
    pub const BEHAVIOR: i32 = 200;
    pub const PERSONA: i32 = 300;
    pub const MEMORY: i32 = 400;
}

/// What an element does when the chain is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementAction {
    /// Insert one system message immediately after any leading system-role
    /// messages, skipping exact-content duplicates.
    Inject { content: String },
    /// Log the composed request; the executor logs the response through the
    /// same element.
    LogRequest,
}

/// One named, ordered unit of the advisor chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineElement {
    pub name: &'static str,
    pub priority: i32,
    pub action: ElementAction,
}

impl PipelineElement {
    pub fn inject(name: &'static str, priority: i32, content: impl Into<String>) -> Self {
        Self {
            name,
            priority,
            action: ElementAction::Inject {
                content: content.into(),
            },
        }
    }

    /// Apply this element to an outgoing message list.
    pub fn apply(&self, messages: &mut Vec<Message>) {
        match &self.action {
            ElementAction::Inject { content } => {
                if messages.iter().any(|m| m.content == *content) {
                    debug!(element = self.name, "Duplicate content, injection skipped");
                    return;
                }
                let at = messages
                    .iter()
                    .position(|m| m.role != Role::System)
                    .unwrap_or(messages.len());
                messages.insert(at, Message::system(content.clone()));
            }
            ElementAction::LogRequest => {}
        }
    }
}

/// Apply a composed chain to a message list, in list order.
///
/// Returns whether a logging element was present; the executor uses this to
/// log the response as well.
pub fn apply_chain(elements: &[PipelineElement], messages: &mut Vec<Message>) -> bool {
    let mut log_requested = false;
    for element in elements {
        element.apply(messages);
        if element.action == ElementAction::LogRequest {
            log_requested = true;
        }
    }
    if log_requested {
        info!(
            messages = messages.len(),
            system = messages.iter().filter(|m| m.role == Role::System).count(),
            "Composed model request"
        );
    }
    log_requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_after_leading_system_messages() {
        let mut messages = vec![
            Message::system("base"),
            Message::user("hello"),
        ];
        PipelineElement::inject("persona-card", priority::PERSONA, "card text")
            .apply(&mut messages);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "base");
        assert_eq!(messages[1].content, "card text");
        assert_eq!(messages[1].role, Role::System);
        assert_eq!(messages[2].content, "hello");
    }

    #[test]
    fn injection_order_preserved_for_successive_elements() {
        let mut messages = vec![Message::user("hi")];
        PipelineElement::inject("system-prompt", priority::SYSTEM, "first").apply(&mut messages);
        PipelineElement::inject("behavior-guide", priority::BEHAVIOR, "second").apply(&mut messages);

        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
        assert_eq!(messages[2].content, "hi");
    }

    #[test]
    fn dedup_by_exact_content() {
        let mut messages = vec![Message::system("same"), Message::user("hi")];
        PipelineElement::inject("system-prompt", priority::SYSTEM, "same").apply(&mut messages);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn empty_message_list_gets_injection() {
        let mut messages = Vec::new();
        PipelineElement::inject("system-prompt", priority::SYSTEM, "only").apply(&mut messages);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn apply_chain_reports_logging() {
        let chain = vec![
            PipelineElement {
                name: "request-logging",
                priority: priority::LOGGING,
                action: ElementAction::LogRequest,
            },
            PipelineElement::inject("system-prompt", priority::SYSTEM, "sys"),
        ];
        let mut messages = vec![Message::user("hi")];
        assert!(apply_chain(&chain, &mut messages));
        assert_eq!(messages.len(), 2);

        let silent = vec![PipelineElement::inject("system-prompt", priority::SYSTEM, "x")];
        let mut messages = vec![Message::user("hi")];
        assert!(!apply_chain(&silent, &mut messages));
    }
}
