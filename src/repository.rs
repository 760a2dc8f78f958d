//! Repository trait definition (Port)
//!
//! This trait defines the storage contract for analytics events.
//! Implementations are PostgreSQL (networked) and SQLite (embedded); no
//! other component branches on the backend kind.

use crate::error::Result;
use crate::types::{EventPayload, RecentEvent, WindowedStats};
use async_trait::async_trait;

/// Repository for analytics events (append, windowed read, age-based delete)
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Idempotently create the event table and its two indexes.
    ///
    /// Safe to run on every process start. This is the single place that
    /// encodes the payload column-typing difference between backends.
    async fn init_schema(&self) -> Result<()>;

    /// Append one event and return its backend-assigned id.
    ///
    /// `created_at` is stamped by the storage engine's own clock. Duplicate
    /// submissions produce duplicate rows; deduplication is the caller's
    /// responsibility.
    async fn insert_event(
        &self,
        user_id: &str,
        event_type: &str,
        surface: &str,
        payload: &EventPayload,
    ) -> Result<i64>;

    /// The `limit` most recent events, newest first, each ranked within its
    /// `(user_id, event_type)` partition.
    async fn recent_events(&self, limit: i64) -> Result<Vec<RecentEvent>>;

    /// Grouped counts and unique-user counts over the trailing window of
    /// `hours_ago` hours (boundary inclusive).
    async fn event_stats(&self, hours_ago: i32) -> Result<WindowedStats>;

    /// Delete events strictly older than `days_old` days; returns the number
    /// of rows removed.
    async fn cleanup_old_events(&self, days_old: i32) -> Result<u64>;

    /// Release the backend connection(s). Idempotent; never fails.
    async fn close(&self);
}
