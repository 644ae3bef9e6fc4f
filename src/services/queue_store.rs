//! Durable queue store backed by SQLite.
//!
//! Two tables: `pending_messages` (the outbox itself, AUTOINCREMENT primary
//! key so ids are insertion-ordered and never reused) and
//! `conversation_cache` (last enqueue activity per conversation). Every
//! operation runs in its own transaction; the schema version lives in
//! `PRAGMA user_version` and upgrades are additive only.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::services::outbox_types::{ConversationCacheEntry, MessageStatus, QueuedMessage};

/// Current schema version recorded in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 2;

pub struct QueueStore {
    pool: SqlitePool,
}

impl QueueStore {
    /// Open (creating on first use) the store at `path` and bring the schema
    /// up to date. Reopening an existing database never touches its rows.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let version: i32 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;

        if version < 1 {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS pending_messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    auth_token TEXT NOT NULL,
                    timestamp_ms INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending'
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_pending_timestamp
                 ON pending_messages (timestamp_ms)",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_pending_conversation
                 ON pending_messages (conversation_id)",
            )
            .execute(&self.pool)
            .await?;
        }

        if version < 2 {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS conversation_cache (
                    conversation_id TEXT PRIMARY KEY,
                    last_queued_at_ms INTEGER NOT NULL,
                    last_content TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_cache_last_queued
                 ON conversation_cache (last_queued_at_ms)",
            )
            .execute(&self.pool)
            .await?;
        }

        if version < SCHEMA_VERSION {
            sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .execute(&self.pool)
                .await?;
            log::info!(
                "Queue store schema migrated from v{} to v{}",
                version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Append a record, stamping the store clock. Returns the assigned id.
    /// An aborted transaction (quota, I/O) surfaces as a storage error and
    /// persists nothing.
    pub async fn insert(
        &self,
        content: &str,
        conversation_id: &str,
        auth_token: &str,
    ) -> Result<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO pending_messages
                 (content, conversation_id, auth_token, timestamp_ms, status)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(content)
        .bind(conversation_id)
        .bind(auth_token)
        .bind(now.timestamp_millis())
        .bind(MessageStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        tx.commit().await?;

        log::debug!("Queued message {} for conversation {}", id, conversation_id);
        Ok(id)
    }

    /// All queued records in insertion order (ascending id). The sync engine
    /// consumes this order as-is.
    pub async fn list_all(&self) -> Result<Vec<QueuedMessage>> {
        let rows = sqlx::query(
            "SELECT id, content, conversation_id, auth_token, timestamp_ms, status
             FROM pending_messages
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(row_to_message(row)?);
        }
        Ok(messages)
    }

    /// Remove one record. Deleting an id that is not present is a no-op.
    pub async fn delete_by_id(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every queued record atomically.
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM pending_messages")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of queued records; this is the pending count the UI sees.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Record the latest enqueue activity for a conversation.
    pub async fn touch_conversation(&self, conversation_id: &str, content: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_cache (conversation_id, last_queued_at_ms, last_content)
             VALUES (?, ?, ?)
             ON CONFLICT(conversation_id)
             DO UPDATE SET last_queued_at_ms = excluded.last_queued_at_ms,
                           last_content = excluded.last_content",
        )
        .bind(conversation_id)
        .bind(Utc::now().timestamp_millis())
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Close the underlying pool. Every operation afterwards returns a
    /// storage error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Cached conversation rows, most recently queued first.
    pub async fn cached_conversations(&self) -> Result<Vec<ConversationCacheEntry>> {
        let rows = sqlx::query(
            "SELECT conversation_id, last_queued_at_ms, last_content
             FROM conversation_cache
             ORDER BY last_queued_at_ms DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(ConversationCacheEntry {
                conversation_id: row.try_get("conversation_id")?,
                last_queued_at: millis_to_datetime(row.try_get("last_queued_at_ms")?),
                last_content: row.try_get("last_content")?,
            });
        }
        Ok(entries)
    }
}

fn row_to_message(row: &SqliteRow) -> Result<QueuedMessage> {
    let status: String = row.try_get("status")?;
    Ok(QueuedMessage {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        conversation_id: row.try_get("conversation_id")?,
        auth_token: row.try_get("auth_token")?,
        timestamp: millis_to_datetime(row.try_get("timestamp_ms")?),
        status: MessageStatus::parse(&status).unwrap_or(MessageStatus::Pending),
    })
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn make_store() -> (QueueStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = QueueStore::open(&tmp.path().join("outbox.db")).await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let (store, _tmp) = make_store().await;

        let a = store.insert("one", "c1", "t1").await.unwrap();
        let b = store.insert("two", "c1", "t1").await.unwrap();
        let c = store.insert("three", "c2", "t1").await.unwrap();
        assert!(a < b && b < c);

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].content, "one");
        assert_eq!(all[2].conversation_id, "c2");
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let (store, _tmp) = make_store().await;

        for i in 0..5 {
            store.insert(&format!("m{}", i), "c1", "t").await.unwrap();
        }
        let ids: Vec<i64> = store.list_all().await.unwrap().iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_delete_absent_id_is_noop() {
        let (store, _tmp) = make_store().await;

        let id = store.insert("hi", "c1", "t").await.unwrap();
        store.delete_by_id(id + 100).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.delete_by_id(id).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        // Deleting again is still fine
        store.delete_by_id(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_is_idempotent() {
        let (store, _tmp) = make_store().await;

        store.insert("a", "c1", "t").await.unwrap();
        store.insert("b", "c2", "t").await.unwrap();

        store.clear_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        store.clear_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_clear() {
        let (store, _tmp) = make_store().await;

        let first = store.insert("a", "c1", "t").await.unwrap();
        store.clear_all().await.unwrap();
        let second = store.insert("b", "c1", "t").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("outbox.db");

        {
            let store = QueueStore::open(&path).await.unwrap();
            store.insert("persisted", "c1", "t").await.unwrap();
        }

        let store = QueueStore::open(&path).await.unwrap();
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "persisted");
        assert_eq!(all[0].status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn test_conversation_cache_tracks_latest() {
        let (store, _tmp) = make_store().await;

        store.touch_conversation("c1", "first").await.unwrap();
        store.touch_conversation("c1", "second").await.unwrap();
        store.touch_conversation("c2", "other").await.unwrap();

        let cached = store.cached_conversations().await.unwrap();
        assert_eq!(cached.len(), 2);
        let c1 = cached.iter().find(|c| c.conversation_id == "c1").unwrap();
        assert_eq!(c1.last_content, "second");
    }
}
