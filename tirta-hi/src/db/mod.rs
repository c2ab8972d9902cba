//! Database access for tirta-hi
//!
//! SQLite database in the resolved data folder. The uploads table is the
//! durable upload registry; retrain_sessions persists per-invocation state
//! and log so status queries survive restarts.

pub mod sessions;
pub mod uploads;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tirta-hi tables if they don't exist
///
/// Public so tests can run against an in-memory pool.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uploads (
            id TEXT PRIMARY KEY,
            stored_file_name TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            data_type TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            range_start TEXT NOT NULL,
            range_end TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploaded',
            training_result TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_file_hash ON uploads(file_hash)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS retrain_sessions (
            session_id TEXT PRIMARY KEY,
            upload_id TEXT NOT NULL,
            state TEXT NOT NULL,
            log TEXT NOT NULL DEFAULT '[]',
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (uploads, retrain_sessions)");

    Ok(())
}
