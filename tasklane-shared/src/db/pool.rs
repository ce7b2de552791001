//! PostgreSQL connection pool
//!
//! The API server owns a single [`PgPool`] for its lifetime. Every request
//! borrows a connection from it; nothing else holds database state in process.
//!
//! ```no_run
//! use tasklane_shared::db::pool::{create_pool, DatabaseConfig};
//!
//! # async fn example() -> Result<(), sqlx::Error> {
//! let pool = create_pool(DatabaseConfig::from_url("postgresql://localhost/tasklane")).await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pool sizing and timeouts. Durations are in seconds so they map directly
/// onto environment variables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Upper bound on open connections
    pub max_connections: u32,

    /// Connections kept warm while idle
    pub min_connections: u32,

    /// How long a request waits for a free connection
    pub acquire_timeout_seconds: u64,

    /// Idle connections are closed after this long (None = never)
    pub idle_timeout_seconds: Option<u64>,

    /// Connections are recycled after this long (None = never)
    pub max_lifetime_seconds: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
        }
    }
}

impl DatabaseConfig {
    /// Default settings for the given URL
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    fn pool_options(&self) -> PgPoolOptions {
        let mut options = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_seconds));

        if let Some(idle) = self.idle_timeout_seconds {
            options = options.idle_timeout(Duration::from_secs(idle));
        }
        if let Some(lifetime) = self.max_lifetime_seconds {
            options = options.max_lifetime(Duration::from_secs(lifetime));
        }

        options
    }
}

/// Connects the pool and verifies the database answers before returning it.
///
/// # Errors
///
/// Fails when the URL is invalid, the server is unreachable, or the health
/// check query does not return the expected row.
pub async fn create_pool(config: DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_seconds = config.acquire_timeout_seconds,
        "Creating database connection pool"
    );

    let pool = config.pool_options().connect(&config.url).await?;
    health_check(&pool).await?;

    info!("Database connection pool ready");
    Ok(pool)
}

/// Builds a pool that only connects on first use.
///
/// Used by router tests that never touch the database and by tooling that
/// must start before PostgreSQL is reachable.
pub fn create_lazy_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    config.pool_options().connect_lazy(&config.url)
}

/// Runs `SELECT 1` against the pool.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    let (value,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;

    if value == 1 {
        debug!("Database health check passed");
        Ok(())
    } else {
        warn!(value, "Database health check returned unexpected value");
        Err(sqlx::Error::Protocol(
            "Health check returned unexpected value".into(),
        ))
    }
}

/// Snapshot of pool usage reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub active_connections: usize,
    pub idle_connections: usize,
    pub total_connections: usize,
}

pub fn get_pool_stats(pool: &PgPool) -> PoolStats {
    let size = pool.size();
    let idle = pool.num_idle() as u32;

    PoolStats {
        active_connections: size.saturating_sub(idle) as usize,
        idle_connections: idle as usize,
        total_connections: size as usize,
    }
}

/// Closes every connection; called once during shutdown.
pub async fn close_pool(pool: PgPool) {
    info!("Closing database connection pool");
    pool.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout_seconds, 30);
        assert_eq!(config.idle_timeout_seconds, Some(600));
        assert_eq!(config.max_lifetime_seconds, Some(1800));
    }

    #[test]
    fn test_from_url_keeps_defaults() {
        let config = DatabaseConfig::from_url("postgresql://localhost/tasklane");
        assert_eq!(config.url, "postgresql://localhost/tasklane");
        assert_eq!(config.max_connections, 10);
    }

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let config = DatabaseConfig::from_url("postgresql://nobody@127.0.0.1:1/none");
        let pool = create_lazy_pool(&config).expect("lazy pool should build without connecting");
        assert_eq!(get_pool_stats(&pool).total_connections, 0);
    }
}
