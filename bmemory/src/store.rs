//! Session and message repositories over the pooled relational store.

use bprovider::Role;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use uuid::Uuid;

use crate::pool::shared_pool;
use crate::types::{role_from_str, role_to_str};
use crate::{MessageRecord, SessionKey, SessionRecord, StoreConfig, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chat_sessions (
        id TEXT PRIMARY KEY,
        session_name TEXT NOT NULL,
        email TEXT NOT NULL,
        expertor TEXT NOT NULL,
        original_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chat_sessions_triple
    ON chat_sessions(session_name, email, expertor);

    CREATE INDEX IF NOT EXISTS idx_chat_sessions_original_name
    ON chat_sessions(original_name);

    CREATE TABLE IF NOT EXISTS chat_messages (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chat_messages_session_created
    ON chat_messages(session_id, created_at);
";

async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|error| StoreError::storage(format!("failed to initialize schema: {error}")))?;
    Ok(())
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| StoreError::storage(format!("malformed timestamp '{value}': {error}")))
}

fn session_from_row(row: &SqliteRow) -> Result<SessionRecord, StoreError> {
    Ok(SessionRecord {
        id: row.get::<String, _>("id"),
        name: row.get::<String, _>("session_name"),
        email: row.get::<String, _>("email"),
        topic: row.get::<String, _>("expertor"),
        original_name: row.get::<String, _>("original_name"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<MessageRecord, StoreError> {
    let metadata = row
        .get::<Option<String>, _>("metadata")
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|error| {
                StoreError::storage(format!("malformed message metadata: {error}"))
            })
        })
        .transpose()?;

    Ok(MessageRecord {
        id: row.get::<String, _>("id"),
        session_id: row.get::<String, _>("session_id"),
        role: role_from_str(&row.get::<String, _>("role")),
        content: row.get::<String, _>("content"),
        metadata,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = shared_pool(config).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Exact triple match first, then the legacy `original_name` key.
    pub async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM chat_sessions
             WHERE session_name = ?1 AND email = ?2 AND expertor = ?3",
        )
        .bind(&key.name)
        .bind(&key.email)
        .bind(&key.topic)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Some(session_from_row(&row)?));
        }

        let row = sqlx::query("SELECT * FROM chat_sessions WHERE original_name = ?1")
            .bind(key.original_name())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| session_from_row(&row)).transpose()
    }

    /// Resolves the session for `key`, creating it on first reference. The
    /// same triple never produces a second row.
    pub async fn resolve_or_create(
        &self,
        key: &SessionKey,
    ) -> Result<SessionRecord, StoreError> {
        if let Some(existing) = self.find(key).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            name: key.name.clone(),
            email: key.email.clone(),
            topic: key.topic.clone(),
            original_name: key.original_name(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO chat_sessions
             (id, session_name, email, expertor, original_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.topic)
        .bind(&record.original_name)
        .bind(timestamp(record.created_at))
        .bind(timestamp(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn touch(&self, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(timestamp(Utc::now()))
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the session and its messages in one transaction. Returns
    /// `false` when no matching session exists.
    pub async fn delete_with_messages(&self, key: &SessionKey) -> Result<bool, StoreError> {
        let Some(session) = self.find(key).await? else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?1")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chat_sessions WHERE id = ?1")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = shared_pool(config).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };

        let metadata_json = record
            .metadata
            .as_ref()
            .map(|value| {
                serde_json::to_string(value).map_err(|error| {
                    StoreError::invalid_request(format!(
                        "failed to serialize message metadata: {error}"
                    ))
                })
            })
            .transpose()?;

        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, role, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(role_to_str(record.role))
        .bind(&record.content)
        .bind(metadata_json)
        .bind(timestamp(record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// The most recent `limit` messages in chronological order. The bound is
    /// a hard context-window control: rows older than the window never reach
    /// the caller.
    pub async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages
             WHERE session_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        messages.reverse();
        Ok(messages)
    }

    pub async fn count(&self, session_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM chat_messages WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("total") as u64)
    }

    pub async fn delete_for_session(&self, session_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
