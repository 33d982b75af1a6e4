//! In-process fast store — the low-latency key/value tier.
//!
//! Stands in for a redis-class store behind the same trait. Guest-tier
//! entries carry a TTL and are evicted lazily on read; durable-tier entries
//! never expire.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use plume_core::error::StoreError;
use plume_core::session::{Session, SessionId};
use plume_core::store::FastStore;

struct Entry {
    session: Session,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// An in-memory fast store with per-entry TTL.
pub struct MemoryFastStore {
    entries: Arc<RwLock<HashMap<SessionId, Entry>>>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryFastStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                Some(entry) if !entry.expired() => return Ok(Some(entry.session.clone())),
                Some(_) => {} // expired, evict below
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(id);
        Ok(None)
    }

    async fn set(&self, session: &Session, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = Entry {
            session: session.clone(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(session.id.clone(), entry);
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_core::persona::PersonaId;
    use plume_core::session::SessionMode;

    fn guest_session() -> Session {
        Session::start(false, PersonaId::from("p1"), SessionMode::Chat).unwrap()
    }

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryFastStore::new();
        let session = guest_session();

        store.set(&session, None).await.unwrap();
        assert!(store.exists(&session.id).await.unwrap());

        let found = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(found, session);

        assert!(store.delete(&session.id).await.unwrap());
        assert!(!store.exists(&session.id).await.unwrap());
        assert!(!store.delete(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let store = MemoryFastStore::new();
        let session = guest_session();

        store
            .set(&session, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(store.exists(&session.id).await.unwrap());

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(store.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_ttl_never_expires() {
        let store = MemoryFastStore::new();
        let session = guest_session();
        store.set(&session, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(store.get(&session.id).await.unwrap().is_some());
    }
}
