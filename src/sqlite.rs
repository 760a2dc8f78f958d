//! Embedded SQLite event store.
//!
//! Single-file store for deployments without a database server. Operations
//! are serialized through one connection; SQLite's own locking provides
//! safety for the append-only workload.

use crate::error::Result;
use crate::repository::EventRepository;
use crate::types::{
    decode_payload, AnalyticsEvent, BreakdownRow, EventPayload, RecentEvent, WindowedStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{debug, info};

/// SQLite-backed event store.
pub struct SqliteEventStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteEventStore {
    /// Open the store at the given file path.
    ///
    /// The pool connects lazily: a bad path (e.g. an unwritable directory)
    /// surfaces through schema initialization rather than here, so concurrent
    /// callers all observe the same failure via the readiness gate.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);

        debug!(path = %path.display(), "sqlite store opened");
        Self { pool, path }
    }

    /// The database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Row mapping for the recent-events query
#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    user_id: String,
    event_type: String,
    surface: String,
    payload: String,
    created_at: DateTime<Utc>,
    sequence: i64,
}

impl From<EventRow> for RecentEvent {
    fn from(row: EventRow) -> Self {
        let payload = decode_payload(serde_json::from_str(&row.payload), row.id);
        RecentEvent {
            event: AnalyticsEvent {
                id: row.id,
                user_id: row.user_id,
                event_type: row.event_type,
                surface: row.surface,
                payload,
                created_at: row.created_at,
            },
            sequence: row.sequence,
        }
    }
}

#[async_trait]
impl EventRepository for SqliteEventStore {
    async fn init_schema(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS discover_web_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                surface TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_discover_web_events_user_type
             ON discover_web_events (user_id, event_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_discover_web_events_created_at
             ON discover_web_events (created_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("analytics event schema ready");
        Ok(())
    }

    async fn insert_event(
        &self,
        user_id: &str,
        event_type: &str,
        surface: &str,
        payload: &EventPayload,
    ) -> Result<i64> {
        let payload_text = serde_json::to_string(payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO discover_web_events (user_id, event_type, surface, payload)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .bind(surface)
        .bind(payload_text)
        .execute(&self.pool)
        .await?;

        let event_id = result.last_insert_rowid();
        debug!(event_id, event_type, surface, "analytics event recorded");
        Ok(event_id)
    }

    async fn recent_events(&self, limit: i64) -> Result<Vec<RecentEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, event_type, surface, payload, created_at,
                   ROW_NUMBER() OVER (
                       PARTITION BY user_id, event_type
                       ORDER BY created_at DESC, id DESC
                   ) AS sequence
            FROM discover_web_events
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn event_stats(&self, hours_ago: i32) -> Result<WindowedStats> {
        let rows: Vec<BreakdownRow> = sqlx::query_as(
            r#"
            SELECT event_type, surface,
                   COUNT(*) AS count,
                   COUNT(DISTINCT user_id) AS unique_users
            FROM discover_web_events
            WHERE created_at >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || CAST(? AS TEXT) || ' hours')
            GROUP BY event_type, surface
            ORDER BY count DESC, event_type, surface
            "#,
        )
        .bind(hours_ago)
        .fetch_all(&self.pool)
        .await?;

        let unique_users: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT user_id)
            FROM discover_web_events
            WHERE created_at >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || CAST(? AS TEXT) || ' hours')
            "#,
        )
        .bind(hours_ago)
        .fetch_one(&self.pool)
        .await?;

        Ok(WindowedStats::from_rows(rows, unique_users))
    }

    async fn cleanup_old_events(&self, days_old: i32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM discover_web_events
             WHERE created_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || CAST(? AS TEXT) || ' days')",
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        debug!(deleted, days_old, "old analytics events removed");
        Ok(deleted)
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("sqlite pool closed");
    }
}
