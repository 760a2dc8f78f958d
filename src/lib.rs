//! Nosh Analytics Event Store
//!
//! Records discrete user-interaction events (feed views, clicks, surface
//! switches) and serves windowed aggregate statistics over them.
//!
//! # Architecture
//!
//! - **Repository trait**: the storage contract (port)
//! - **SQLite store**: embedded single-file implementation
//! - **PostgreSQL store**: networked, pooled implementation
//! - **AnalyticsStore**: selects a backend from the connection descriptor at
//!   construction and gates every operation behind schema readiness
//!
//! Events are immutable once written: there is insert, windowed aggregation,
//! and age-based deletion — nothing else.
//!
//! # Usage
//!
//! ```rust,no_run
//! use nosh_analytics::{AnalyticsConfig, AnalyticsStore, EventPayload, ANONYMOUS_USER};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalyticsConfig::from_env()?;
//!     let store = AnalyticsStore::connect(&config).await?;
//!
//!     store
//!         .insert_event(ANONYMOUS_USER, "view", "web", &EventPayload::feed_view(12))
//!         .await?;
//!
//!     let stats = store.event_stats(None).await?;
//!     println!("{} events from {} users", stats.total_events, stats.unique_users);
//!
//!     store.close().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod config;
mod error;
mod postgres;
mod repository;
mod sqlite;
mod store;
mod types;

// Re-exports
pub use config::{
    AnalyticsConfig, BackendKind, Environment, DEFAULT_EMBEDDED_PATH, DEFAULT_POOL_SIZE,
};
pub use error::{AnalyticsError, Result};
pub use postgres::PgEventStore;
pub use repository::EventRepository;
pub use sqlite::SqliteEventStore;
pub use store::{
    AnalyticsStore, DEFAULT_RECENT_LIMIT, DEFAULT_RETENTION_DAYS, DEFAULT_STATS_WINDOW_HOURS,
};
pub use types::{
    AnalyticsEvent, BreakdownRow, EventPayload, EventTypeStats, GroupStats, RecentEvent,
    SurfaceStats, WindowedStats, ANONYMOUS_USER,
};
