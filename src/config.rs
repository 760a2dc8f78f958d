//! Analytics store configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{AnalyticsError, Result};
use std::env;

/// Default embedded database path, used when no connection URL is configured.
pub const DEFAULT_EMBEDDED_PATH: &str = "data/analytics.db";

/// Default connection pool bound for the networked backend.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Storage backend kind, decided from the connection descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Networked PostgreSQL store, pooled across concurrent callers
    Postgres,
    /// Embedded single-file SQLite store
    Sqlite,
}

impl BackendKind {
    /// Decide the backend from a connection descriptor: a networked-database
    /// URL selects PostgreSQL, anything else is treated as a local file path.
    pub fn detect(descriptor: &str) -> Self {
        if descriptor.starts_with("postgres://") || descriptor.starts_with("postgresql://") {
            BackendKind::Postgres
        } else {
            BackendKind::Sqlite
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            "sqlite" | "embedded" => Ok(BackendKind::Sqlite),
            other => Err(AnalyticsError::Config(format!(
                "Invalid NOSH_ANALYTICS_BACKEND: {}. Expected: postgres, sqlite",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Postgres => write!(f, "postgres"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment (requires TLS on networked connections)
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Analytics store configuration.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Analytics-specific connection descriptor; takes precedence over the
    /// generic database URL
    pub database_url: Option<String>,
    /// Generic database connection URL shared with the rest of the app
    pub generic_database_url: Option<String>,
    /// Forced backend kind; `None` means decide from the descriptor
    pub forced_backend: Option<BackendKind>,
    /// Networked backend connection pool bound
    pub pool_size: u32,
    /// Environment (test, development, production)
    pub environment: Environment,
}

impl AnalyticsConfig {
    /// Load configuration from environment variables.
    ///
    /// Recognized variables:
    /// - `NOSH_ANALYTICS_DATABASE_URL`: analytics-specific descriptor
    /// - `DATABASE_URL`: generic connection URL
    /// - `NOSH_ANALYTICS_BACKEND`: force `postgres` or `sqlite`
    /// - `NOSH_ANALYTICS_POOL_SIZE`: pool bound (default: 10)
    /// - `NOSH_ENV`: environment (default: development)
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let database_url = env::var("NOSH_ANALYTICS_DATABASE_URL").ok();
        let generic_database_url = env::var("DATABASE_URL").ok();

        let forced_backend = match env::var("NOSH_ANALYTICS_BACKEND") {
            Ok(value) => Some(BackendKind::parse(&value)?),
            Err(_) => None,
        };

        let pool_size = match env::var("NOSH_ANALYTICS_POOL_SIZE") {
            Ok(value) => value.parse::<u32>().map_err(|_| {
                AnalyticsError::Config(format!("Invalid NOSH_ANALYTICS_POOL_SIZE: {}", value))
            })?,
            Err(_) => DEFAULT_POOL_SIZE,
        };

        let environment = Self::load_environment()?;

        Ok(Self {
            database_url,
            generic_database_url,
            forced_backend,
            pool_size,
            environment,
        })
    }

    /// Configuration for an embedded store at an explicit file path.
    pub fn embedded(path: impl Into<String>) -> Self {
        Self {
            database_url: Some(path.into()),
            generic_database_url: None,
            forced_backend: None,
            pool_size: DEFAULT_POOL_SIZE,
            environment: Environment::Development,
        }
    }

    /// Resolve the connection descriptor: explicit analytics URL, then the
    /// generic database URL, then the default embedded file path.
    pub fn descriptor(&self) -> &str {
        self.database_url
            .as_deref()
            .or(self.generic_database_url.as_deref())
            .unwrap_or(DEFAULT_EMBEDDED_PATH)
    }

    fn load_environment() -> Result<Environment> {
        let env_str = env::var("NOSH_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(AnalyticsError::Config(format!(
                "Invalid NOSH_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            generic_database_url: None,
            forced_backend: None,
            pool_size: DEFAULT_POOL_SIZE,
            environment: Environment::Development,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
