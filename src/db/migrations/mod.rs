use sqlx::SqlitePool;
use tracing::debug;

/// Schema statements, applied in order; each one is idempotent
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_correlations",
        r#"
        CREATE TABLE IF NOT EXISTS correlations (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "002_index_correlations_expiry",
        r#"
        CREATE INDEX IF NOT EXISTS idx_correlations_expires_at
            ON correlations (expires_at)
        "#,
    ),
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for (name, sql) in MIGRATIONS {
        sqlx::query(sql).execute(pool).await?;
        debug!("Applied migration: {}", name);
    }

    Ok(())
}
