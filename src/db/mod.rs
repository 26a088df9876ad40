use crate::config::DatabaseConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod migrations;
pub mod repositories;

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Minimal durable key/value contract with per-entry expiry
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry, expiring after `ttl`
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the value for `key`; expired entries are reported as absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Physically remove expired entries, returning how many were deleted
    async fn purge_expired(&self) -> Result<u64>;
}

/// Database service for handling connections and migrations
pub struct DatabaseService {
    pub pool: Arc<SqlitePool>,
}

impl DatabaseService {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing database at {}", config.path.display());

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Database(format!(
                        "Failed to create data folder {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, used by tests and throwaway runs
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is its own database, so pin the pool to one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let service = Self {
            pool: Arc::new(pool),
        };
        service.run_migrations().await?;
        Ok(service)
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        info!("Database migrations completed successfully");

        Ok(())
    }
}
