//! Session service — lifecycle, tier selection, and the dual-store
//! read/write path.
//!
//! Read path: guest ids touch only the fast store. Owner ids read the fast
//! store first; on miss the durable store is consulted and a hit is written
//! back (read-through, no expiry for durable-tier entries).
//!
//! Write path: guest sessions write only to the fast store under a TTL.
//! Owner sessions dual-write, fast store first — a crash between the two
//! writes leaves the durable store behind, and the fast store stays
//! authoritative for the live process until the next save reconciles.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use plume_core::error::Error;
use plume_core::memory::{MemoryPage, Turn};
use plume_core::persona::PersonaId;
use plume_core::session::{Session, SessionId, SessionMemoryPolicy, SessionMode};
use plume_core::store::{DurableStore, EphemeralTurnStore, FastStore};

pub struct SessionService {
    fast: Arc<dyn FastStore>,
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralTurnStore>,
    guest_ttl: Duration,
}

impl SessionService {
    pub fn new(
        fast: Arc<dyn FastStore>,
        durable: Arc<dyn DurableStore>,
        ephemeral: Arc<dyn EphemeralTurnStore>,
        guest_ttl: Duration,
    ) -> Self {
        Self {
            fast,
            durable,
            ephemeral,
            guest_ttl,
        }
    }

    /// Start a new session with the policy chosen by ownership.
    pub async fn start(
        &self,
        owner: bool,
        persona_id: PersonaId,
        mode: SessionMode,
    ) -> Result<Session, Error> {
        let session = Session::start(owner, persona_id, mode)?;
        self.save(&session).await?;
        info!(session = %session.id, owner, "Session started");
        Ok(session)
    }

    /// Find a session by id, honoring the tier discriminator.
    pub async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        if id.is_guest() {
            return Ok(self.fast.get(id).await?);
        }

        if let Some(session) = self.fast.get(id).await? {
            return Ok(Some(session));
        }

        match self.durable.find_session(id).await? {
            Some(session) => {
                // Read-through: repopulate the fast store, no expiry.
                self.fast.set(&session, None).await?;
                debug!(session = %id, "Fast store repopulated from durable store");
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Persist a session to its tier's store(s).
    pub async fn save(&self, session: &Session) -> Result<(), Error> {
        match session.meta.memory_policy {
            SessionMemoryPolicy::SessionOnly => {
                self.fast.set(session, Some(self.guest_ttl)).await?;
            }
            SessionMemoryPolicy::Persistent => {
                // Fast store first; the durable store reconciles on the next
                // save if we crash between the two writes.
                self.fast.set(session, None).await?;
                self.durable.upsert_session(session).await?;
            }
        }
        Ok(())
    }

    /// Load a session or surface a typed not-found failure.
    pub async fn require(&self, id: &SessionId) -> Result<Session, Error> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("session", id.to_string()))
    }

    /// Record a turn: append to the tier's history store and bump activity.
    pub async fn record_turn(&self, session: &mut Session, turn: Turn) -> Result<(), Error> {
        match session.meta.memory_policy {
            SessionMemoryPolicy::SessionOnly => self.ephemeral.append(&turn).await?,
            SessionMemoryPolicy::Persistent => self.durable.append_turn(&turn).await?,
        }
        session.touch();
        self.save(session).await
    }

    pub async fn archive(&self, id: &SessionId) -> Result<Session, Error> {
        let mut session = self.require(id).await?;
        session.archive();
        self.save(&session).await?;
        Ok(session)
    }

    pub async fn unarchive(&self, id: &SessionId) -> Result<Session, Error> {
        let mut session = self.require(id).await?;
        session.unarchive();
        self.save(&session).await?;
        Ok(session)
    }

    /// Toggle tool enablement on a session's configuration.
    pub async fn set_tools(&self, id: &SessionId, enabled: bool) -> Result<Session, Error> {
        let mut session = self.require(id).await?;
        session.meta.tools_enabled = enabled;
        self.save(&session).await?;
        Ok(session)
    }

    /// Delete a session. Durable sessions cascade to their memory rows;
    /// ephemeral sessions only ever lived in the fast store and the
    /// process-local history.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, Error> {
        let existed_fast = self.fast.delete(id).await?;
        if id.is_guest() {
            self.ephemeral.clear(id).await?;
            return Ok(existed_fast);
        }
        let existed_durable = self.durable.delete_session_cascade(id).await?;
        Ok(existed_fast || existed_durable)
    }

    /// Durable sessions, newest activity first.
    pub async fn list(&self, include_archived: bool) -> Result<Vec<Session>, Error> {
        Ok(self.durable.list_sessions(include_archived).await?)
    }

    /// Paged memory retrieval, newest first.
    ///
    /// `cursor` is an exclusive upper bound on the turn timestamp. The
    /// `has_more` flag comes from a one-row lookahead using the oldest
    /// returned timestamp as the next cursor.
    pub async fn page_memory(
        &self,
        id: &SessionId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<MemoryPage, Error> {
        if limit == 0 {
            return Err(Error::validation("page limit must be > 0"));
        }

        let turns = if id.is_guest() {
            self.page_ephemeral(id, cursor, limit).await?
        } else {
            self.durable.page_turns(id, cursor, limit).await?
        };

        if turns.is_empty() {
            return Ok(MemoryPage::empty());
        }

        let next_cursor = turns.last().map(|t| t.created_at);
        let has_more = match next_cursor {
            Some(oldest) => {
                let lookahead = if id.is_guest() {
                    self.page_ephemeral(id, Some(oldest), 1).await?
                } else {
                    self.durable.page_turns(id, Some(oldest), 1).await?
                };
                !lookahead.is_empty()
            }
            None => false,
        };

        Ok(MemoryPage {
            turns,
            has_more,
            next_cursor,
        })
    }

    /// Cursor paging over the process-local guest history.
    async fn page_ephemeral(
        &self,
        id: &SessionId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Turn>, Error> {
        let mut history = self.ephemeral.recent(id, usize::MAX).await?;
        history.reverse(); // newest first
        Ok(history
            .into_iter()
            .filter(|t| cursor.is_none_or(|c| t.created_at < c))
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plume_core::error::StoreError;
    use plume_store::{MemoryFastStore, ProcessTurnStore, SqliteStore};
    use std::sync::Mutex;

    /// Durable store decorator recording whether it was invoked.
    struct RecordingDurable {
        inner: SqliteStore,
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingDurable {
        async fn new() -> Self {
            Self {
                inner: SqliteStore::new("sqlite::memory:").await.unwrap(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn touched(&self) -> bool {
            !self.calls.lock().unwrap().is_empty()
        }
    }

    #[async_trait]
    impl DurableStore for RecordingDurable {
        async fn append_turn(&self, turn: &Turn) -> Result<(), StoreError> {
            self.record("append_turn");
            self.inner.append_turn(turn).await
        }
        async fn page_turns(
            &self,
            id: &SessionId,
            cursor: Option<DateTime<Utc>>,
            limit: usize,
        ) -> Result<Vec<Turn>, StoreError> {
            self.record("page_turns");
            self.inner.page_turns(id, cursor, limit).await
        }
        async fn recent_turns(&self, id: &SessionId, limit: usize) -> Result<Vec<Turn>, StoreError> {
            self.record("recent_turns");
            self.inner.recent_turns(id, limit).await
        }
        async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
            self.record("upsert_session");
            self.inner.upsert_session(session).await
        }
        async fn find_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
            self.record("find_session");
            self.inner.find_session(id).await
        }
        async fn list_sessions(&self, include_archived: bool) -> Result<Vec<Session>, StoreError> {
            self.record("list_sessions");
            self.inner.list_sessions(include_archived).await
        }
        async fn delete_session_cascade(&self, id: &SessionId) -> Result<bool, StoreError> {
            self.record("delete_session_cascade");
            self.inner.delete_session_cascade(id).await
        }
    }

    async fn service() -> (SessionService, Arc<RecordingDurable>, Arc<MemoryFastStore>) {
        let fast = Arc::new(MemoryFastStore::new());
        let durable = Arc::new(RecordingDurable::new().await);
        let svc = SessionService::new(
            Arc::clone(&fast) as Arc<dyn FastStore>,
            Arc::clone(&durable) as Arc<dyn DurableStore>,
            Arc::new(ProcessTurnStore::new()),
            Duration::from_secs(1800),
        );
        (svc, durable, fast)
    }

    #[tokio::test]
    async fn guest_roundtrip_never_touches_durable_store() {
        let (svc, durable, _) = service().await;
        let session = svc
            .start(false, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();

        let found = svc.find_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found, session);
        assert!(!durable.touched());
    }

    #[tokio::test]
    async fn owner_read_through_repopulates_fast_store() {
        let (svc, _durable, fast) = service().await;
        let session = svc
            .start(true, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();

        // Drop the fast-store entry but not the durable row.
        assert!(fast.delete(&session.id).await.unwrap());

        let found = svc.find_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.meta, session.meta);

        // The fast store must hold the entry again.
        assert!(fast.get(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let (svc, _, _) = service().await;
        assert!(svc.find_by_id(&SessionId::owner()).await.unwrap().is_none());
        assert!(svc.find_by_id(&SessionId::guest()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_turn_appends_to_tier_store() {
        let (svc, durable, _) = service().await;

        let mut owner = svc
            .start(true, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();
        let owner_id = owner.id.clone();
        svc.record_turn(&mut owner, Turn::user(owner_id, "hi"))
            .await
            .unwrap();
        assert!(durable.calls.lock().unwrap().contains(&"append_turn"));

        let mut guest = svc
            .start(false, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();
        let calls_before = durable.calls.lock().unwrap().len();
        let guest_id = guest.id.clone();
        svc.record_turn(&mut guest, Turn::user(guest_id, "hi"))
            .await
            .unwrap();
        // Guest turn must not add durable calls.
        assert_eq!(durable.calls.lock().unwrap().len(), calls_before);
    }

    #[tokio::test]
    async fn paged_memory_25_turns() {
        let (svc, _, _) = service().await;
        let mut session = svc
            .start(true, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();

        let base = Utc::now();
        for i in 0..25 {
            let mut turn = Turn::user(session.id.clone(), format!("turn {i}"));
            turn.created_at = base + chrono::Duration::seconds(i64::from(i));
            svc.record_turn(&mut session, turn).await.unwrap();
        }

        let first = svc.page_memory(&session.id, None, 10).await.unwrap();
        assert_eq!(first.turns.len(), 10);
        assert_eq!(first.turns[0].content, "turn 24");
        assert!(first.has_more);

        let second = svc
            .page_memory(&session.id, first.next_cursor, 10)
            .await
            .unwrap();
        assert_eq!(second.turns.len(), 10);
        assert_eq!(second.turns[0].content, "turn 14");
        assert!(second.has_more);

        let third = svc
            .page_memory(&session.id, second.next_cursor, 10)
            .await
            .unwrap();
        assert_eq!(third.turns.len(), 5);
        assert_eq!(third.turns[4].content, "turn 0");
        assert!(!third.has_more);
    }

    #[tokio::test]
    async fn archive_unarchive_roundtrip() {
        let (svc, _, _) = service().await;
        let session = svc
            .start(true, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();

        let archived = svc.archive(&session.id).await.unwrap();
        assert!(archived.archived);

        let restored = svc.unarchive(&session.id).await.unwrap();
        assert!(!restored.archived);
    }

    #[tokio::test]
    async fn delete_cascades_for_durable_sessions() {
        let (svc, durable, _) = service().await;
        let mut session = svc
            .start(true, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();
        let session_id = session.id.clone();
        svc.record_turn(&mut session, Turn::user(session_id, "hi"))
            .await
            .unwrap();

        assert!(svc.delete(&session.id).await.unwrap());
        assert!(
            durable
                .calls
                .lock()
                .unwrap()
                .contains(&"delete_session_cascade")
        );
        assert!(svc.find_by_id(&session.id).await.unwrap().is_none());
        let page = svc.page_memory(&session.id, None, 10).await.unwrap();
        assert!(page.turns.is_empty());
    }

    #[tokio::test]
    async fn guest_delete_skips_durable() {
        let (svc, durable, _) = service().await;
        let session = svc
            .start(false, PersonaId::from("p1"), SessionMode::Chat)
            .await
            .unwrap();

        assert!(svc.delete(&session.id).await.unwrap());
        assert!(!durable.touched());
    }

    #[tokio::test]
    async fn set_tools_toggles_flag() {
        let (svc, _, _) = service().await;
        let session = svc
            .start(true, PersonaId::from("p1"), SessionMode::Agent)
            .await
            .unwrap();
        assert!(!session.meta.tools_enabled);

        let updated = svc.set_tools(&session.id, true).await.unwrap();
        assert!(updated.meta.tools_enabled);

        let found = svc.find_by_id(&session.id).await.unwrap().unwrap();
        assert!(found.meta.tools_enabled);
    }
}
