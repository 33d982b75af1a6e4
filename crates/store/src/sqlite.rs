//! SQLite implementation of the relational collaborators.
//!
//! One database file holds all tables:
//! - `personas`, `prompts`, `model_configs`, `global_memory` — admin-edited
//!   reference data
//! - `sessions`, `memory_turns` — durable conversation state, with
//!   `memory_turns` cascading on session delete
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so lexicographic
//! ordering matches chronological ordering (the paging cursor relies on
//! this).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use plume_core::error::StoreError;
use plume_core::memory::{GlobalMemoryRecord, Turn};
use plume_core::message::Role;
use plume_core::model::ModelConfiguration;
use plume_core::persona::{Persona, PersonaId};
use plume_core::prompt::{Prompt, PromptKind};
use plume_core::session::{Session, SessionId, SessionMeta};
use plume_core::store::{
    DurableStore, GlobalMemoryStore, ModelConfigStore, PersonaStore, PromptStore,
};

/// A production SQLite store backing every relational collaborator trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("Bad timestamp '{raw}': {e}")))
}

impl SqliteStore {
    /// Create a new SQLite store from a connection path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database exists per connection; a pool of one keeps
        // the schema visible to every query.
        let mut pool_options = SqlitePoolOptions::new().max_connections(4);
        if path.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS personas (
                id            TEXT PRIMARY KEY,
                name          TEXT UNIQUE NOT NULL,
                description   TEXT NOT NULL DEFAULT '',
                cover         TEXT,
                card          TEXT NOT NULL,
                enabled       INTEGER NOT NULL DEFAULT 1,
                world_book_id TEXT,
                deleted       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("personas table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompts (
                id           TEXT NOT NULL,
                category_key TEXT PRIMARY KEY,
                kind         TEXT NOT NULL,
                content      TEXT NOT NULL,
                enabled      INTEGER NOT NULL DEFAULT 1,
                description  TEXT NOT NULL DEFAULT '',
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("prompts table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_configs (
                id          TEXT PRIMARY KEY,
                provider    TEXT NOT NULL,
                settings    TEXT NOT NULL,
                enabled     INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("model_configs table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS global_memory (
                id         TEXT PRIMARY KEY,
                content    TEXT NOT NULL,
                enabled    INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("global_memory table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id             TEXT PRIMARY KEY,
                meta           TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                last_active_at TEXT NOT NULL,
                archived       INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_turns (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT UNIQUE NOT NULL,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("memory_turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_session_created
             ON memory_turns(session_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_persona(row: &sqlx::sqlite::SqliteRow) -> Result<Persona, StoreError> {
        let card_json: String = row.get("card");
        Ok(Persona {
            id: PersonaId::from(row.get::<String, _>("id").as_str()),
            name: row.get("name"),
            description: row.get("description"),
            cover: row.get("cover"),
            card: serde_json::from_str(&card_json)
                .map_err(|e| StoreError::QueryFailed(format!("Bad persona card: {e}")))?,
            enabled: row.get::<i64, _>("enabled") != 0,
            world_book_id: row.get("world_book_id"),
            deleted: row.get::<i64, _>("deleted") != 0,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        })
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StoreError> {
        let role: String = row.get("role");
        Ok(Turn {
            id: row.get("id"),
            session_id: SessionId::parse(&row.get::<String, _>("session_id"))
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?,
            role: role
                .parse::<Role>()
                .map_err(StoreError::QueryFailed)?,
            content: row.get("content"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        })
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        let meta_json: String = row.get("meta");
        let meta: SessionMeta = serde_json::from_str(&meta_json)
            .map_err(|e| StoreError::QueryFailed(format!("Bad session meta: {e}")))?;
        Ok(Session {
            id: SessionId::parse(&row.get::<String, _>("id"))
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?,
            meta,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            last_active_at: parse_ts(&row.get::<String, _>("last_active_at"))?,
            archived: row.get::<i64, _>("archived") != 0,
        })
    }

    fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<ModelConfiguration, StoreError> {
        let provider_json: String = row.get("provider");
        let settings_json: String = row.get("settings");
        Ok(ModelConfiguration {
            id: row.get("id"),
            provider: serde_json::from_str(&provider_json)
                .map_err(|e| StoreError::QueryFailed(format!("Bad provider: {e}")))?,
            settings: serde_json::from_str(&settings_json)
                .map_err(|e| StoreError::QueryFailed(format!("Bad settings: {e}")))?,
            enabled: row.get::<i64, _>("enabled") != 0,
            description: row.get("description"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        })
    }
}

#[async_trait]
impl PersonaStore for SqliteStore {
    async fn find_by_id(&self, id: &PersonaId) -> Result<Option<Persona>, StoreError> {
        let row = sqlx::query("SELECT * FROM personas WHERE id = ? AND deleted = 0")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        row.map(|r| Self::row_to_persona(&r)).transpose()
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM personas WHERE name = ? AND deleted = 0")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn list_enabled(&self) -> Result<Vec<Persona>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM personas WHERE enabled = 1 AND deleted = 0 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_persona).collect()
    }

    async fn save(&self, persona: &Persona) -> Result<(), StoreError> {
        let card = serde_json::to_string(&persona.card)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO personas
                (id, name, description, cover, card, enabled, world_book_id, deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                cover = excluded.cover,
                card = excluded.card,
                enabled = excluded.enabled,
                world_book_id = excluded.world_book_id,
                deleted = excluded.deleted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(persona.id.as_str())
        .bind(&persona.name)
        .bind(&persona.description)
        .bind(&persona.cover)
        .bind(card)
        .bind(persona.enabled as i64)
        .bind(&persona.world_book_id)
        .bind(persona.deleted as i64)
        .bind(ts(persona.created_at))
        .bind(ts(persona.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &PersonaId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM personas WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PromptStore for SqliteStore {
    async fn find_by_key_enabled(&self, category_key: &str) -> Result<Option<Prompt>, StoreError> {
        let row = sqlx::query("SELECT * FROM prompts WHERE category_key = ? AND enabled = 1")
            .bind(category_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        row.map(|r| {
            let kind: String = r.get("kind");
            Ok(Prompt {
                id: r.get("id"),
                kind: match kind.as_str() {
                    "template" => PromptKind::Template,
                    "global" => PromptKind::Global,
                    other => {
                        return Err(StoreError::QueryFailed(format!("Bad prompt kind: {other}")));
                    }
                },
                category_key: r.get("category_key"),
                content: r.get("content"),
                enabled: r.get::<i64, _>("enabled") != 0,
                description: r.get("description"),
                created_at: parse_ts(&r.get::<String, _>("created_at"))?,
                updated_at: parse_ts(&r.get::<String, _>("updated_at"))?,
            })
        })
        .transpose()
    }

    async fn save(&self, prompt: &Prompt) -> Result<(), StoreError> {
        let kind = match prompt.kind {
            PromptKind::Template => "template",
            PromptKind::Global => "global",
        };
        sqlx::query(
            r#"
            INSERT INTO prompts
                (id, category_key, kind, content, enabled, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(category_key) DO UPDATE SET
                kind = excluded.kind,
                content = excluded.content,
                enabled = excluded.enabled,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&prompt.id)
        .bind(&prompt.category_key)
        .bind(kind)
        .bind(&prompt.content)
        .bind(prompt.enabled as i64)
        .bind(&prompt.description)
        .bind(ts(prompt.created_at))
        .bind(ts(prompt.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ModelConfigStore for SqliteStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<ModelConfiguration>, StoreError> {
        let row = sqlx::query("SELECT * FROM model_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        row.map(|r| Self::row_to_config(&r)).transpose()
    }

    async fn find_enabled(&self) -> Result<Option<ModelConfiguration>, StoreError> {
        let row = sqlx::query("SELECT * FROM model_configs WHERE enabled = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        row.map(|r| Self::row_to_config(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<ModelConfiguration>, StoreError> {
        let rows = sqlx::query("SELECT * FROM model_configs ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_config).collect()
    }

    async fn save(&self, config: &ModelConfiguration) -> Result<(), StoreError> {
        let provider = serde_json::to_string(&config.provider)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let settings = serde_json::to_string(&config.settings)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO model_configs
                (id, provider, settings, enabled, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                settings = excluded.settings,
                enabled = excluded.enabled,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.id)
        .bind(provider)
        .bind(settings)
        .bind(config.enabled as i64)
        .bind(&config.description)
        .bind(ts(config.created_at))
        .bind(ts(config.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    async fn enable_exclusive(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        sqlx::query("UPDATE model_configs SET enabled = 0 WHERE enabled = 1")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let result = sqlx::query("UPDATE model_configs SET enabled = 1, updated_at = ? WHERE id = ?")
            .bind(ts(Utc::now()))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "No model configuration with id {id}"
            )));
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

#[async_trait]
impl GlobalMemoryStore for SqliteStore {
    async fn list_enabled(&self) -> Result<Vec<GlobalMemoryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM global_memory WHERE enabled = 1 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        rows.iter()
            .map(|r| {
                Ok(GlobalMemoryRecord {
                    id: r.get("id"),
                    content: r.get("content"),
                    enabled: r.get::<i64, _>("enabled") != 0,
                    created_at: parse_ts(&r.get::<String, _>("created_at"))?,
                    updated_at: parse_ts(&r.get::<String, _>("updated_at"))?,
                })
            })
            .collect()
    }

    async fn save(&self, record: &GlobalMemoryRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO global_memory (id, content, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.content)
        .bind(record.enabled as i64)
        .bind(ts(record.created_at))
        .bind(ts(record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM global_memory WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn append_turn(&self, turn: &Turn) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO memory_turns (id, session_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&turn.id)
        .bind(turn.session_id.as_str())
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(ts(turn.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    async fn page_turns(
        &self,
        id: &SessionId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let rows = match cursor {
            Some(cursor) => {
                sqlx::query(
                    "SELECT * FROM memory_turns
                     WHERE session_id = ? AND created_at < ?
                     ORDER BY created_at DESC, iid DESC LIMIT ?",
                )
                .bind(id.as_str())
                .bind(ts(cursor))
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM memory_turns
                     WHERE session_id = ?
                     ORDER BY created_at DESC, iid DESC LIMIT ?",
                )
                .bind(id.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn recent_turns(&self, id: &SessionId, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let mut turns = self.page_turns(id, None, limit).await?;
        turns.reverse(); // chronological for the memory window
        Ok(turns)
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let meta = serde_json::to_string(&session.meta)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, meta, created_at, last_active_at, archived)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                meta = excluded.meta,
                last_active_at = excluded.last_active_at,
                archived = excluded.archived
            "#,
        )
        .bind(session.id.as_str())
        .bind(meta)
        .bind(ts(session.created_at))
        .bind(ts(session.last_active_at))
        .bind(session.archived as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    async fn find_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        row.map(|r| Self::row_to_session(&r)).transpose()
    }

    async fn list_sessions(&self, include_archived: bool) -> Result<Vec<Session>, StoreError> {
        let sql = if include_archived {
            "SELECT * FROM sessions ORDER BY last_active_at DESC"
        } else {
            "SELECT * FROM sessions WHERE archived = 0 ORDER BY last_active_at DESC"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        rows.iter().map(Self::row_to_session).collect()
    }

    async fn delete_session_cascade(&self, id: &SessionId) -> Result<bool, StoreError> {
        // memory_turns rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
