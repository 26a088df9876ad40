use crate::db::{Clock, KvStore, SystemClock};
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// SQLite-backed key/value store with per-entry expiry
#[derive(Clone)]
pub struct CorrelationsRepository {
    pool: Arc<SqlitePool>,
    clock: Arc<dyn Clock>,
}

impl CorrelationsRepository {
    /// Create a new correlations repository using the wall clock
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Create a repository with an explicit clock
    pub fn with_clock(pool: Arc<SqlitePool>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl KvStore for CorrelationsRepository {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.now_millis().saturating_add(ttl_millis);

        sqlx::query(
            r#"
            INSERT INTO correlations (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to store correlation: {}", e)))?;

        debug!("Stored correlation {} -> {}", key, value);

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            r#"
            SELECT value
            FROM correlations
            WHERE key = ?1 AND expires_at > ?2
            "#,
        )
        .bind(key)
        .bind(self.now_millis())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get correlation: {}", e)))?;

        Ok(value)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM correlations
            WHERE expires_at <= ?1
            "#,
        )
        .bind(self.now_millis())
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to purge expired correlations: {}", e)))?;

        Ok(result.rows_affected())
    }
}
