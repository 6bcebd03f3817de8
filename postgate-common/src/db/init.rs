//! Database initialization
//!
//! Creates the database on first run with the default schema and settings.
//! All steps are idempotent; calling `init_database` against an existing
//! database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode: concurrent readers with one writer. The poller and the
    // interaction handlers both write; WAL keeps them from blocking reads.
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent). Exposed separately so tests can build a
/// schema on an in-memory pool.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_drafts_table(pool).await?;
    create_submissions_table(pool).await?;
    create_settings_table(pool).await?;
    Ok(())
}

async fn create_drafts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drafts (
            draft_id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            media_ref TEXT,
            tags TEXT,
            source TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            surfaced_at TEXT,
            decided_at TEXT,
            decided_by TEXT,
            decision_rationale TEXT,
            expired_at TEXT,
            published_at TEXT,
            external_id TEXT,
            external_url TEXT,
            message_ref TEXT,
            publishing_since TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            retry_eligible INTEGER NOT NULL DEFAULT 1,
            last_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Poller scans: pending-unsurfaced (FIFO) and approved-unpublished
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_drafts_status_created ON drafts (status, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            submission_id TEXT PRIMARY KEY,
            form_data TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            processed_at TEXT,
            draft_id TEXT REFERENCES drafts(draft_id),
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize default settings (INSERT OR IGNORE; existing values win)
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    let defaults: &[(&str, &str)] = &[
        ("poll_interval_seconds", "30"),
        ("decision_window_hours", "24"),
        ("publish_retry_ceiling", "3"),
        ("auto_decline_on_expiry", "0"),
        ("max_post_length", "3000"),
        ("surface_timeout_seconds", "10"),
        ("publish_timeout_seconds", "30"),
    ];

    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}
