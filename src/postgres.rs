//! Networked PostgreSQL event store.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, Result};
use crate::repository::EventRepository;
use crate::types::{
    decode_payload, AnalyticsEvent, BreakdownRow, EventPayload, RecentEvent, WindowedStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::{debug, info};

/// PostgreSQL-backed event store.
///
/// Multiplexes a bounded connection pool across concurrent operations; every
/// operation is append-only or read-only, so no locking beyond the pool's own
/// is needed.
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Open a connection pool for the configured descriptor.
    ///
    /// Fails fast: an unparseable URL or unreachable server is reported here,
    /// not deferred to the first operation. Production requires TLS; other
    /// environments prefer it.
    pub async fn connect(config: &AnalyticsConfig) -> Result<Self> {
        let ssl_mode = if config.environment.is_production() {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let options = config
            .descriptor()
            .parse::<PgConnectOptions>()
            .map_err(|err| {
                AnalyticsError::Connection(format!("Invalid PostgreSQL URL: {}", err))
            })?
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(options)
            .await
            .map_err(|err| {
                AnalyticsError::Connection(format!("Failed to connect to PostgreSQL: {}", err))
            })?;

        debug!(pool_size = config.pool_size, "postgres pool opened");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by integration tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row mapping for the recent-events query
#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    user_id: String,
    event_type: String,
    surface: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    sequence: i64,
}

impl From<EventRow> for RecentEvent {
    fn from(row: EventRow) -> Self {
        let payload = decode_payload(serde_json::from_value(row.payload), row.id);
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
impl EventRepository for PgEventStore {
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS discover_web_events (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                surface TEXT NOT NULL,
                payload JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
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
        let event_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO discover_web_events (user_id, event_type, surface, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .bind(surface)
        .bind(sqlx::types::Json(payload))
        .fetch_one(&self.pool)
        .await?;

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
            LIMIT $1
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
            WHERE created_at >= NOW() - make_interval(hours => $1)
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
            WHERE created_at >= NOW() - make_interval(hours => $1)
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
             WHERE created_at < NOW() - make_interval(days => $1)",
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
        debug!("postgres pool closed");
    }
}
