//! Task requests and the strategy capability.

use serde::{Deserialize, Serialize};

/// A one-shot task request. Closed set, discriminated by variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskRequest {
    /// Summarize a blog article. Input is the fetched article body.
    ArticleSummary { title: String, body: String },
    /// Write a short companion note from the supplied context.
    Companion { context: String },
    /// Congratulate on a milestone described by the context.
    Congratulation { context: String },
}

impl TaskRequest {
    /// The `task.*` category-key suffix for this request.
    pub fn code(&self) -> &'static str {
        match self {
            TaskRequest::ArticleSummary { .. } => "article_summary",
            TaskRequest::Companion { .. } => "companion",
            TaskRequest::Congratulation { .. } => "congratulation",
        }
    }
}

/// The capability each task variant implements.
pub trait TaskStrategy: Send + Sync {
    fn strategy_name(&self) -> &'static str;

    /// Whether this strategy accepts the request.
    fn validate(&self, request: &TaskRequest) -> bool;

    /// The model-facing input text.
    fn extract_input(&self, request: &TaskRequest) -> Option<String>;
}

struct ArticleSummaryStrategy;

impl TaskStrategy for ArticleSummaryStrategy {
    fn strategy_name(&self) -> &'static str {
        "article_summary"
    }

    fn validate(&self, request: &TaskRequest) -> bool {
        matches!(request, TaskRequest::ArticleSummary { .. })
    }

    fn extract_input(&self, request: &TaskRequest) -> Option<String> {
        match request {
            TaskRequest::ArticleSummary { title, body } => {
                let body = body.trim();
                if body.is_empty() {
                    return None;
                }
                Some(if title.trim().is_empty() {
                    body.to_string()
                } else {
                    format!("{}\n\n{}", title.trim(), body)
                })
            }
            _ => None,
        }
    }
}

struct CompanionStrategy;

impl TaskStrategy for CompanionStrategy {
    fn strategy_name(&self) -> &'static str {
        "companion"
    }

    fn validate(&self, request: &TaskRequest) -> bool {
        matches!(request, TaskRequest::Companion { .. })
    }

    fn extract_input(&self, request: &TaskRequest) -> Option<String> {
        match request {
            TaskRequest::Companion { context } => {
                let context = context.trim();
                (!context.is_empty()).then(|| context.to_string())
            }
            _ => None,
        }
    }
}

struct CongratulationStrategy;

impl TaskStrategy for CongratulationStrategy {
    fn strategy_name(&self) -> &'static str {
        "congratulation"
    }

    fn validate(&self, request: &TaskRequest) -> bool {
        matches!(request, TaskRequest::Congratulation { .. })
    }

    fn extract_input(&self, request: &TaskRequest) -> Option<String> {
        match request {
            TaskRequest::Congratulation { context } => {
                let context = context.trim();
                (!context.is_empty()).then(|| context.to_string())
            }
            _ => None,
        }
    }
}

/// Dispatch a request to its strategy.
pub fn strategy_for(request: &TaskRequest) -> &'static dyn TaskStrategy {
    match request {
        TaskRequest::ArticleSummary { .. } => &ArticleSummaryStrategy,
        TaskRequest::Companion { .. } => &CompanionStrategy,
        TaskRequest::Congratulation { .. } => &CongratulationStrategy,
    }
}
