//! Analytics store facade: backend selection and lifecycle.
//!
//! `AnalyticsStore` owns the chosen backend, kicks off schema initialization
//! at construction, and gates every operation behind the captured readiness
//! result. Host applications construct it at startup and call [`close`]
//! from their own shutdown path.
//!
//! [`close`]: AnalyticsStore::close

use crate::config::{AnalyticsConfig, BackendKind};
use crate::error::{AnalyticsError, Result};
use crate::postgres::PgEventStore;
use crate::repository::EventRepository;
use crate::sqlite::SqliteEventStore;
use crate::types::{EventPayload, RecentEvent, WindowedStats};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Default number of events returned by the recent-events reader.
pub const DEFAULT_RECENT_LIMIT: i64 = 50;

/// Default stats window, in hours.
pub const DEFAULT_STATS_WINDOW_HOURS: i32 = 24;

/// Default retention cutoff, in days.
pub const DEFAULT_RETENTION_DAYS: i32 = 30;

type ReadyCell = OnceCell<std::result::Result<(), Arc<AnalyticsError>>>;

/// Analytics event store over an embedded or networked backend.
///
/// Cheap to clone; clones share the backend connection(s) and the readiness
/// state.
#[derive(Clone)]
pub struct AnalyticsStore {
    backend: Arc<dyn EventRepository>,
    ready: Arc<ReadyCell>,
}

impl AnalyticsStore {
    /// Open the store for the configured connection descriptor.
    ///
    /// A `postgres://` / `postgresql://` descriptor selects the networked
    /// backend (connecting immediately, failing fast); anything else is
    /// treated as an embedded file path (connecting lazily, with open errors
    /// surfacing through the readiness gate). Schema initialization starts in
    /// the background; operations await its outcome.
    pub async fn connect(config: &AnalyticsConfig) -> Result<Self> {
        let kind = resolve_backend(config)?;

        let backend: Arc<dyn EventRepository> = match kind {
            BackendKind::Postgres => Arc::new(PgEventStore::connect(config).await?),
            BackendKind::Sqlite => Arc::new(SqliteEventStore::open(config.descriptor())),
        };

        info!(backend = %kind, "analytics store connected");
        Ok(Self::with_backend(backend))
    }

    /// Wrap an explicit repository implementation.
    ///
    /// Must be called within a Tokio runtime; schema initialization is
    /// spawned immediately.
    pub fn with_backend(backend: Arc<dyn EventRepository>) -> Self {
        let store = Self {
            backend,
            ready: Arc::new(OnceCell::new()),
        };
        store.spawn_init();
        store
    }

    /// Append one event; returns its backend-assigned id.
    ///
    /// The caller substitutes [`ANONYMOUS_USER`] when it cannot attribute the
    /// event; this layer requires the id it is given.
    ///
    /// [`ANONYMOUS_USER`]: crate::ANONYMOUS_USER
    pub async fn insert_event(
        &self,
        user_id: &str,
        event_type: &str,
        surface: &str,
        payload: &EventPayload,
    ) -> Result<i64> {
        self.initialized().await?;
        self.backend
            .insert_event(user_id, event_type, surface, payload)
            .await
    }

    /// The most recent events, newest first, each with its rank within the
    /// `(user_id, event_type)` partition. `None` or a non-positive limit
    /// falls back to [`DEFAULT_RECENT_LIMIT`].
    pub async fn recent_events(&self, limit: Option<i64>) -> Result<Vec<RecentEvent>> {
        self.initialized().await?;
        self.backend
            .recent_events(positive_or(limit, DEFAULT_RECENT_LIMIT))
            .await
    }

    /// Aggregate stats over the trailing window. `None` or a non-positive
    /// value falls back to [`DEFAULT_STATS_WINDOW_HOURS`]. The boundary is
    /// inclusive: an event exactly at "now minus N hours" is counted.
    pub async fn event_stats(&self, hours_ago: Option<i64>) -> Result<WindowedStats> {
        self.initialized().await?;
        self.backend
            .event_stats(window_or(hours_ago, DEFAULT_STATS_WINDOW_HOURS))
            .await
    }

    /// Delete events strictly older than the cutoff; returns the number of
    /// rows removed. `None` or a non-positive value falls back to
    /// [`DEFAULT_RETENTION_DAYS`]. Nothing schedules this internally; invoke
    /// it from an external scheduler.
    pub async fn cleanup_old_events(&self, days_old: Option<i64>) -> Result<u64> {
        self.initialized().await?;
        self.backend
            .cleanup_old_events(window_or(days_old, DEFAULT_RETENTION_DAYS))
            .await
    }

    /// Release the backend connection(s).
    ///
    /// Waits for any in-flight initialization first, then closes. Idempotent,
    /// safe to call even when initialization failed, and never fails itself.
    pub async fn close(&self) {
        // a failed init must not block shutdown
        let _ = self.initialized().await;
        self.backend.close().await;
    }

    /// Await the one-shot schema initialization outcome.
    ///
    /// The first caller (normally the task spawned at construction) runs the
    /// initialization; everyone else observes the stored result. A failure is
    /// permanent until the process restarts.
    async fn initialized(&self) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let outcome = self
            .ready
            .get_or_init(|| async move { backend.init_schema().await.map_err(Arc::new) })
            .await;

        outcome.clone().map_err(AnalyticsError::Init)
    }

    fn spawn_init(&self) {
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(err) = store.initialized().await {
                error!(error = %err, "analytics schema initialization failed");
            }
        });
    }
}

/// Resolve the backend kind, honoring a forced override.
fn resolve_backend(config: &AnalyticsConfig) -> Result<BackendKind> {
    let detected = BackendKind::detect(config.descriptor());

    match config.forced_backend {
        None => Ok(detected),
        Some(kind) if kind == detected => Ok(kind),
        Some(BackendKind::Postgres) => Err(AnalyticsError::Config(
            "Networked backend forced but no postgres:// connection URL is configured \
             (set NOSH_ANALYTICS_DATABASE_URL or DATABASE_URL)"
                .to_string(),
        )),
        Some(BackendKind::Sqlite) => Err(AnalyticsError::Config(
            "Embedded backend forced but the connection descriptor is a network URL".to_string(),
        )),
    }
}

fn positive_or(value: Option<i64>, default: i64) -> i64 {
    match value {
        Some(v) if v > 0 => v,
        _ => default,
    }
}

fn window_or(value: Option<i64>, default: i32) -> i32 {
    match value {
        Some(v) if v > 0 => v.min(i32::MAX as i64) as i32,
        _ => default,
    }
}

// =============================================================================
// Tests
// =============================================================================
