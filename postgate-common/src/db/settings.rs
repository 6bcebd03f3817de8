//! Settings table access
//!
//! Runtime-tunable knobs stored as key/value strings. Defaults are seeded by
//! `init::init_default_settings`; typed getters fall back to the same
//! defaults when a key is missing or malformed.

use crate::Result;
use sqlx::SqlitePool;
use tracing::warn;

/// Get a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Set a setting value (upsert)
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    match get_setting(pool, key).await? {
        Some(raw) => match raw.parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) => {
                warn!("Setting '{}' has non-integer value '{}', using default {}", key, raw, default);
                Ok(default)
            }
        },
        None => Ok(default),
    }
}

/// Poller tick interval in seconds (default 30)
pub async fn poll_interval_seconds(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "poll_interval_seconds", 30).await
}

/// Reviewer decision window in hours (default 24)
pub async fn decision_window_hours(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "decision_window_hours", 24).await
}

/// Maximum publish attempts before retry is locked out (default 3)
pub async fn publish_retry_ceiling(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "publish_retry_ceiling", 3).await
}

/// Whether expiry auto-declines instead of only disabling controls (default off)
pub async fn auto_decline_on_expiry(pool: &SqlitePool) -> Result<bool> {
    Ok(get_i64(pool, "auto_decline_on_expiry", 0).await? != 0)
}

/// Maximum draft body length in characters (default 3000, the platform limit)
pub async fn max_post_length(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "max_post_length", 3000).await
}

/// Per-item reviewer-surface call timeout in seconds (default 10)
pub async fn surface_timeout_seconds(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "surface_timeout_seconds", 10).await
}

/// Publish API call timeout in seconds (default 30)
pub async fn publish_timeout_seconds(pool: &SqlitePool) -> Result<i64> {
    get_i64(pool, "publish_timeout_seconds", 30).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::{create_tables, init_default_settings};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        create_tables(&pool).await.unwrap();
        init_default_settings(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_defaults_seeded() {
        let pool = memory_pool().await;
        assert_eq!(poll_interval_seconds(&pool).await.unwrap(), 30);
        assert_eq!(decision_window_hours(&pool).await.unwrap(), 24);
        assert_eq!(publish_retry_ceiling(&pool).await.unwrap(), 3);
        assert!(!auto_decline_on_expiry(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overrides_default() {
        let pool = memory_pool().await;
        set_setting(&pool, "poll_interval_seconds", "5").await.unwrap();
        assert_eq!(poll_interval_seconds(&pool).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_malformed_value_falls_back() {
        let pool = memory_pool().await;
        set_setting(&pool, "publish_retry_ceiling", "many").await.unwrap();
        assert_eq!(publish_retry_ceiling(&pool).await.unwrap(), 3);
    }
}
