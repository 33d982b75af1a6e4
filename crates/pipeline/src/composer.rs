//! Pipeline composer — merges cached element sets and the per-turn memory
//! element into one ordered chain.
//!
//! Every step is additive and order-preserving. The only failure that
//! escapes is the persona-cache inconsistency; a memory-element failure
//! degrades to a stateless turn.

use std::sync::Arc;
use tracing::warn;

use plume_core::error::PipelineError;
use plume_core::prompt::BehaviorType;
use plume_core::session::{MemoryTier, RequestPlan};
use plume_core::store::{DurableStore, EphemeralTurnStore};

use crate::cache::PipelineCacheManager;
use crate::element::PipelineElement;
use crate::factory::ElementFactory;

pub struct PipelineComposer {
    cache: Arc<PipelineCacheManager>,
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralTurnStore>,
}

impl PipelineComposer {
    pub fn new(
        cache: Arc<PipelineCacheManager>,
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralTurnStore>,
    ) -> Self {
        Self {
            cache,
            durable,
            ephemeral,
        }
    }

    pub fn cache(&self) -> &Arc<PipelineCacheManager> {
        &self.cache
    }

    /// Compose the ordered chain for one turn.
    ///
    /// Steps: logging element, cached global-memory element, ensured
    /// behavior set, persona set (must already be ensured), one
    /// session-memory element from the plan's tier, then a stable
    /// priority-ascending sort.
    pub async fn compose(
        &self,
        plan: &RequestPlan,
        behavior: BehaviorType,
    ) -> Result<Vec<PipelineElement>, PipelineError> {
        let mut elements = vec![ElementFactory::logging_element()];

        if let Some(global) = self.cache.global_element().await {
            elements.push(global);
        }

        let behavior_set = self.cache.ensure_behavior(behavior).await;
        elements.extend(behavior_set.iter().cloned());

        let persona_set = self.cache.persona_elements(&plan.persona_id).await?;
        elements.extend(persona_set.iter().cloned());

        if let Some(memory) = self.memory_element(plan).await {
            elements.push(memory);
        }

        // Stable: ties keep insertion order between runs.
        elements.sort_by_key(|e| e.priority);
        Ok(elements)
    }

    /// Build the session-memory element for the plan's tier. Failures
    /// degrade to no element rather than aborting the turn.
    async fn memory_element(&self, plan: &RequestPlan) -> Option<PipelineElement> {
        let turns = match plan.memory.tier {
            MemoryTier::Durable => {
                self.durable
                    .recent_turns(&plan.session_id, plan.memory.window)
                    .await
            }
            MemoryTier::Ephemeral => {
                self.ephemeral
                    .recent(&plan.session_id, plan.memory.window)
                    .await
            }
        };

        match turns {
            Ok(turns) => ElementFactory::session_memory_element(&turns),
            Err(e) => {
                warn!(
                    session = %plan.session_id,
                    error = %e,
                    "Memory element construction failed, continuing stateless"
                );
                None
            }
        }
    }
}
