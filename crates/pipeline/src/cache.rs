//! The three pipeline caches: global-memory element, behavior-type element
//! sets, persona element sets.
//!
//! Per key the state machine is absent → building → present. `ensure` is
//! tolerant of concurrent duplicate builds: element construction is a pure
//! computation over already-fetched data, so the last writer wins and no
//! per-key lock is held across the build. Writers only install fresh whole
//! values; evictors only remove — a present entry is always valid.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use plume_core::error::PipelineError;
use plume_core::persona::{Persona, PersonaId};
use plume_core::prompt::BehaviorType;
use plume_core::store::GlobalMemoryStore;
use plume_prompt::PromptAssembler;

use crate::element::PipelineElement;
use crate::factory::ElementFactory;

/// Owns the three caches and the builders that fill them.
pub struct PipelineCacheManager {
    assembler: Arc<PromptAssembler>,
    global_memory: Arc<dyn GlobalMemoryStore>,

    global_element: RwLock<Option<PipelineElement>>,
    behavior_elements: RwLock<HashMap<BehaviorType, Arc<Vec<PipelineElement>>>>,
    persona_elements: RwLock<HashMap<PersonaId, Arc<Vec<PipelineElement>>>>,
}

impl PipelineCacheManager {
    pub fn new(assembler: Arc<PromptAssembler>, global_memory: Arc<dyn GlobalMemoryStore>) -> Self {
        Self {
            assembler,
            global_memory,
            global_element: RwLock::new(None),
            behavior_elements: RwLock::new(HashMap::new()),
            persona_elements: RwLock::new(HashMap::new()),
        }
    }

    /// Ensure the element set for a behavior type is present, building it on
    /// first use.
    pub async fn ensure_behavior(&self, behavior: BehaviorType) -> Arc<Vec<PipelineElement>> {
        if let Some(existing) = self.behavior_elements.read().await.get(&behavior) {
            return Arc::clone(existing);
        }

        let (base_system, behavior_guide) = self.assembler.assemble_behavior(behavior).await;
        let built = Arc::new(ElementFactory::behavior_elements(
            &base_system,
            &behavior_guide,
        ));
        debug!(%behavior, elements = built.len(), "Behavior element set built");

        self.behavior_elements
            .write()
            .await
            .insert(behavior, Arc::clone(&built));
        built
    }

    /// Ensure the element set for a persona is present, building it on first
    /// use.
    pub async fn ensure_persona(&self, persona: &Persona) -> Arc<Vec<PipelineElement>> {
        if let Some(existing) = self.persona_elements.read().await.get(&persona.id) {
            return Arc::clone(existing);
        }

        let card = self.assembler.assemble_persona_card(persona).await;
        let built = Arc::new(ElementFactory::persona_elements(&card));
        debug!(persona = %persona.id, elements = built.len(), "Persona element set built");

        self.persona_elements
            .write()
            .await
            .insert(persona.id.clone(), Arc::clone(&built));
        built
    }

    /// Read a persona's element set. Absence is a programming error in the
    /// composition path — callers must `ensure_persona` first.
    pub async fn persona_elements(
        &self,
        id: &PersonaId,
    ) -> Result<Arc<Vec<PipelineElement>>, PipelineError> {
        self.persona_elements
            .read()
            .await
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| PipelineError::CacheInconsistency {
                persona_id: id.to_string(),
            })
    }

    /// Read a behavior element set without building.
    pub async fn behavior_elements(
        &self,
        behavior: BehaviorType,
    ) -> Option<Arc<Vec<PipelineElement>>> {
        self.behavior_elements.read().await.get(&behavior).map(Arc::clone)
    }

    /// The cached global-memory element, if any.
    pub async fn global_element(&self) -> Option<PipelineElement> {
        self.global_element.read().await.clone()
    }

    /// Rebuild the global-memory element from the store. An empty or failed
    /// read clears the slot rather than leaving a stale entry.
    pub async fn rebuild_global_memory(&self) {
        let element = match self.global_memory.list_enabled().await {
            Ok(records) => ElementFactory::global_memory_element(&records),
            Err(e) => {
                warn!(error = %e, "Global memory read failed, element cleared");
                None
            }
        };
        *self.global_element.write().await = element;
    }

    /// Evict one persona's element set.
    pub async fn remove_persona(&self, id: &PersonaId) {
        self.persona_elements.write().await.remove(id);
    }

    /// Evict every persona element set (e.g. a `char.*` template changed).
    pub async fn clear_personas(&self) {
        self.persona_elements.write().await.clear();
    }

    /// Evict every behavior element set (e.g. `system.*`/`behavior.*`
    /// template changed).
    pub async fn clear_behaviors(&self) {
        self.behavior_elements.write().await.clear();
    }

    /// Full reset, for unrecoverable errors.
    pub async fn clear_all(&self) {
        self.behavior_elements.write().await.clear();
        self.persona_elements.write().await.clear();
        *self.global_element.write().await = None;
    }

    /// Number of cached persona element sets (test/diagnostic aid).
    pub async fn persona_entry_count(&self) -> usize {
        self.persona_elements.read().await.len()
    }
}
