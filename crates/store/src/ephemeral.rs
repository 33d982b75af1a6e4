//! Process-local ephemeral turn history for guest sessions.
//!
//! Not shared across nodes and lost on restart — guest sessions are not
//! expected to survive one. Each session's history is capped to bound
//! memory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use plume_core::error::StoreError;
use plume_core::memory::Turn;
use plume_core::session::SessionId;
use plume_core::store::EphemeralTurnStore;

const DEFAULT_CAP: usize = 200;

/// In-process turn store with a per-session cap.
pub struct ProcessTurnStore {
    turns: Arc<RwLock<HashMap<SessionId, Vec<Turn>>>>,
    cap: usize,
}

impl ProcessTurnStore {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            turns: Arc::new(RwLock::new(HashMap::new())),
            cap,
        }
    }
}

impl Default for ProcessTurnStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EphemeralTurnStore for ProcessTurnStore {
    async fn append(&self, turn: &Turn) -> Result<(), StoreError> {
        let mut turns = self.turns.write().await;
        let history = turns.entry(turn.session_id.clone()).or_default();
        history.push(turn.clone());
        if history.len() > self.cap {
            let overflow = history.len() - self.cap;
            history.drain(..overflow);
        }
        Ok(())
    }

    async fn recent(&self, id: &SessionId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let turns = self.turns.read().await;
        Ok(turns
            .get(id)
            .map(|history| {
                let skip = history.len().saturating_sub(limit);
                history[skip..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, id: &SessionId) -> Result<(), StoreError> {
        self.turns.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_window() {
        let store = ProcessTurnStore::new();
        let sid = SessionId::guest();
        for i in 0..5 {
            store
                .append(&Turn::user(sid.clone(), format!("turn {i}")))
                .await
                .unwrap();
        }

        let recent = store.recent(&sid, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4"]);
    }

    #[tokio::test]
    async fn cap_drops_oldest() {
        let store = ProcessTurnStore::with_cap(3);
        let sid = SessionId::guest();
        for i in 0..5 {
            store
                .append(&Turn::user(sid.clone(), format!("turn {i}")))
                .await
                .unwrap();
        }

        let all = store.recent(&sid, 100).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].content, "turn 2");
    }

    #[tokio::test]
    async fn clear_removes_history() {
        let store = ProcessTurnStore::new();
        let sid = SessionId::guest();
        store.append(&Turn::user(sid.clone(), "x")).await.unwrap();
        store.clear(&sid).await.unwrap();
        assert!(store.recent(&sid, 10).await.unwrap().is_empty());

        let unknown = store.recent(&SessionId::guest(), 10).await.unwrap();
        assert!(unknown.is_empty());
    }
}
