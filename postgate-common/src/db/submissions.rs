//! Intake submission database operations

use crate::db::models::{format_ts, parse_ts, parse_ts_opt, Submission, SubmissionStatus};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn submission_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Submission> {
    let submission_id: String = row.get("submission_id");
    let form_data: String = row.get("form_data");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let draft_id: Option<String> = row.get("draft_id");

    Ok(Submission {
        submission_id: Uuid::parse_str(&submission_id)
            .map_err(|e| Error::Internal(format!("invalid submission_id: {}", e)))?,
        form_data: serde_json::from_str(&form_data)
            .map_err(|e| Error::Internal(format!("invalid form_data json: {}", e)))?,
        source: row.get("source"),
        status: SubmissionStatus::parse(&status)?,
        created_at: parse_ts(&created_at)?,
        processed_at: parse_ts_opt(row.get("processed_at"))?,
        draft_id: draft_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("invalid draft_id: {}", e)))?,
        error_message: row.get("error_message"),
    })
}

/// Insert a new submission in `pending`
pub async fn create_submission(
    pool: &SqlitePool,
    form_data: &serde_json::Value,
    source: &str,
) -> Result<Submission> {
    let submission_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO submissions (submission_id, form_data, source, status, created_at)
        VALUES (?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(submission_id.to_string())
    .bind(
        serde_json::to_string(form_data)
            .map_err(|e| Error::InvalidInput(format!("form_data not serializable: {}", e)))?,
    )
    .bind(source)
    .bind(format_ts(Utc::now()))
    .execute(pool)
    .await?;

    get_submission(pool, submission_id)
        .await?
        .ok_or_else(|| Error::Internal("submission vanished after insert".to_string()))
}

/// Load a submission by id
pub async fn get_submission(pool: &SqlitePool, submission_id: Uuid) -> Result<Option<Submission>> {
    let row = sqlx::query(
        "SELECT submission_id, form_data, source, status, created_at, processed_at, \
         draft_id, error_message FROM submissions WHERE submission_id = ?",
    )
    .bind(submission_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(submission_from_row).transpose()
}

/// Mark a submission as handed to the generation pipeline
pub async fn mark_processing(pool: &SqlitePool, submission_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE submissions SET status = 'processing' \
         WHERE submission_id = ? AND status = 'pending'",
    )
    .bind(submission_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record generation completion, linking the produced draft
pub async fn mark_completed(pool: &SqlitePool, submission_id: Uuid, draft_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE submissions SET status = 'completed', processed_at = ?, draft_id = ? \
         WHERE submission_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(format_ts(Utc::now()))
    .bind(draft_id.to_string())
    .bind(submission_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record generation failure. Pending submissions keep their row so the
/// form data is never lost.
pub async fn mark_failed(pool: &SqlitePool, submission_id: Uuid, error: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE submissions SET status = 'failed', processed_at = ?, error_message = ? \
         WHERE submission_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(format_ts(Utc::now()))
    .bind(error)
    .bind(submission_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record a webhook forwarding error without changing status; the next
/// administrative action can re-forward
pub async fn record_forward_error(
    pool: &SqlitePool,
    submission_id: Uuid,
    error: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE submissions SET error_message = ? WHERE submission_id = ?",
    )
    .bind(error)
    .bind(submission_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
