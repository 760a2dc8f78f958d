//! Analytics store errors

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in the analytics store
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Configuration error (bad or missing environment values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error (pool construction, descriptor parsing)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (embedded data directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema initialization failed; every operation observes the same
    /// underlying error until the process restarts
    #[error("Analytics store initialization failed: {0}")]
    Init(Arc<AnalyticsError>),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
