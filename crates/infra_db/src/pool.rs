//! Connection pool configuration
//!
//! Pool settings come either from the builder or from the environment
//! (`DATABASE_URL` plus optional `DB_MAX_CONNECTIONS` /
//! `DB_MIN_CONNECTIONS`), with `.env` files loaded via `dotenvy`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use core_kernel::StoreError;

pub type DatabasePool = PgPool;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }

    /// Reads `DATABASE_URL` (required) and the optional `DB_MAX_CONNECTIONS`
    /// / `DB_MIN_CONNECTIONS` overrides. `.env` files are honored.
    pub fn from_env() -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Connection("DATABASE_URL is not set".to_string()))?;
        let mut config = Self::new(url);
        if let Ok(max) = std::env::var("DB_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.max_connections = max;
            }
        }
        if let Ok(min) = std::env::var("DB_MIN_CONNECTIONS") {
            if let Ok(min) = min.parse() {
                config.min_connections = min;
            }
        }
        Ok(config)
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Creates the connection pool used to open `PgTx` transactions.
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool, StoreError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    Ok(pool)
}

pub async fn create_pool_from_url(url: &str) -> Result<DatabasePool, StoreError> {
    create_pool(DatabaseConfig::new(url)).await
}
