//! Draft database operations
//!
//! Every write that changes `status` (or claims `message_ref`) is a
//! status-guarded conditional UPDATE and reports via `rows_affected` whether
//! it won. That conditional write is the system's only concurrency-control
//! primitive; callers must branch on the returned bool instead of assuming
//! the transition happened.

use crate::db::models::{
    drafts_claim_prefix, format_ts, parse_ts, parse_ts_opt, Draft, DraftStatus, NewDraft,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const DRAFT_COLUMNS: &str = "draft_id, body, media_ref, tags, source, status, created_at, \
     surfaced_at, decided_at, decided_by, decision_rationale, expired_at, published_at, \
     external_id, external_url, message_ref, retry_count, retry_eligible, last_error";

fn draft_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Draft> {
    let draft_id: String = row.get("draft_id");
    let status: String = row.get("status");
    let tags: Option<String> = row.get("tags");
    let created_at: String = row.get("created_at");

    Ok(Draft {
        draft_id: Uuid::parse_str(&draft_id)
            .map_err(|e| Error::Internal(format!("invalid draft_id '{}': {}", draft_id, e)))?,
        body: row.get("body"),
        media_ref: row.get("media_ref"),
        tags: tags
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("invalid tags json: {}", e)))?,
        source: row.get("source"),
        status: DraftStatus::parse(&status)?,
        created_at: parse_ts(&created_at)?,
        surfaced_at: parse_ts_opt(row.get("surfaced_at"))?,
        decided_at: parse_ts_opt(row.get("decided_at"))?,
        decided_by: row.get("decided_by"),
        decision_rationale: row.get("decision_rationale"),
        expired_at: parse_ts_opt(row.get("expired_at"))?,
        published_at: parse_ts_opt(row.get("published_at"))?,
        external_id: row.get("external_id"),
        external_url: row.get("external_url"),
        message_ref: row.get("message_ref"),
        retry_count: row.get("retry_count"),
        retry_eligible: row.get::<i64, _>("retry_eligible") != 0,
        last_error: row.get("last_error"),
    })
}

/// Insert a new draft in `pending`
pub async fn create_draft(pool: &SqlitePool, new: &NewDraft) -> Result<Draft> {
    let draft_id = Uuid::new_v4();
    let created_at = Utc::now();
    let tags_json = new
        .tags
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::InvalidInput(format!("tags not serializable: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO drafts (draft_id, body, media_ref, tags, source, status, created_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(draft_id.to_string())
    .bind(&new.body)
    .bind(&new.media_ref)
    .bind(tags_json)
    .bind(&new.source)
    .bind(format_ts(created_at))
    .execute(pool)
    .await?;

    get_draft(pool, draft_id)
        .await?
        .ok_or_else(|| Error::Internal("draft vanished after insert".to_string()))
}

/// Load a draft by id
pub async fn get_draft(pool: &SqlitePool, draft_id: Uuid) -> Result<Option<Draft>> {
    let sql = format!("SELECT {} FROM drafts WHERE draft_id = ?", DRAFT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(draft_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(draft_from_row).transpose()
}

/// Pending drafts not yet surfaced, oldest first (FIFO fairness)
pub async fn pending_unsurfaced(pool: &SqlitePool) -> Result<Vec<Draft>> {
    let sql = format!(
        "SELECT {} FROM drafts WHERE status = 'pending' AND message_ref IS NULL \
         ORDER BY created_at ASC",
        DRAFT_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(draft_from_row).collect()
}

/// Approved drafts awaiting publication, oldest decision first
pub async fn approved_unpublished(pool: &SqlitePool) -> Result<Vec<Draft>> {
    let sql = format!(
        "SELECT {} FROM drafts WHERE status = 'approved' AND external_id IS NULL \
         ORDER BY decided_at ASC",
        DRAFT_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(draft_from_row).collect()
}

/// Surfaced pending drafts whose decision window elapsed before `cutoff`
/// and have not been marked expired yet
pub async fn surfaced_pending_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Draft>> {
    let sql = format!(
        "SELECT {} FROM drafts WHERE status = 'pending' AND expired_at IS NULL \
         AND message_ref IS NOT NULL AND message_ref NOT LIKE ? \
         AND surfaced_at IS NOT NULL AND surfaced_at < ? \
         ORDER BY surfaced_at ASC",
        DRAFT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(format!("{}%", drafts_claim_prefix()))
        .bind(format_ts(cutoff))
        .fetch_all(pool)
        .await?;
    rows.iter().map(draft_from_row).collect()
}

/// Drafts stuck in the `publishing` claim since before `cutoff`
/// (crashed or timed-out publisher)
pub async fn publishing_stale_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Draft>> {
    let sql = format!(
        "SELECT {} FROM drafts WHERE status = 'publishing' \
         AND (publishing_since IS NULL OR publishing_since < ?)",
        DRAFT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(format_ts(cutoff))
        .fetch_all(pool)
        .await?;
    rows.iter().map(draft_from_row).collect()
}

/// Claim a draft for surfacing by installing a claim token into
/// `message_ref`. First writer wins; a concurrent caller gets `false` and
/// must not render.
pub async fn claim_surfacing(pool: &SqlitePool, draft_id: Uuid, token: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET message_ref = ? \
         WHERE draft_id = ? AND status = 'pending' AND message_ref IS NULL",
    )
    .bind(token)
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replace a surfacing claim with the real message handle
pub async fn record_message_ref(
    pool: &SqlitePool,
    draft_id: Uuid,
    token: &str,
    message_ref: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET message_ref = ?, surfaced_at = ? \
         WHERE draft_id = ? AND message_ref = ?",
    )
    .bind(message_ref)
    .bind(format_ts(Utc::now()))
    .bind(draft_id.to_string())
    .bind(token)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release a surfacing claim after render failure so the next poll tick
/// retries. Surfacing failure never touches `status`.
pub async fn release_surfacing_claim(
    pool: &SqlitePool,
    draft_id: Uuid,
    token: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET message_ref = NULL WHERE draft_id = ? AND message_ref = ?",
    )
    .bind(draft_id.to_string())
    .bind(token)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record a reviewer decision. Valid only while the draft is still
/// `pending` and the decision window has not elapsed; a losing concurrent
/// caller gets `false` and must surface a stale-decision error, not
/// overwrite.
///
/// An edit request passes `status_after = Pending`: the draft stays
/// eligible for re-review, with the rationale recorded and `message_ref`
/// retained so it is not automatically re-surfaced.
pub async fn record_decision(
    pool: &SqlitePool,
    draft_id: Uuid,
    status_after: DraftStatus,
    decided_by: &str,
    rationale: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = ?, decided_by = ?, decided_at = ?, decision_rationale = ? \
         WHERE draft_id = ? AND status = 'pending' AND expired_at IS NULL",
    )
    .bind(status_after.as_str())
    .bind(decided_by)
    .bind(format_ts(Utc::now()))
    .bind(rationale)
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stamp `expired_at`, disabling further decisions. Status is unchanged.
pub async fn mark_expired(pool: &SqlitePool, draft_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET expired_at = ? \
         WHERE draft_id = ? AND status = 'pending' AND expired_at IS NULL",
    )
    .bind(format_ts(Utc::now()))
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Auto-decline an expired draft (policy-gated; runs after `mark_expired`,
/// so it does not require `expired_at IS NULL`)
pub async fn decline_on_expiry(
    pool: &SqlitePool,
    draft_id: Uuid,
    decided_by: &str,
    rationale: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'declined', decided_by = ?, decided_at = ?, \
         decision_rationale = ? \
         WHERE draft_id = ? AND status = 'pending'",
    )
    .bind(decided_by)
    .bind(format_ts(Utc::now()))
    .bind(rationale)
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Claim `approved -> publishing` so the external API is invoked at most
/// once per approval. `publishing_since` records the claim time for the
/// stuck-publish sweep; decision audit fields are untouched.
pub async fn claim_publishing(pool: &SqlitePool, draft_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'publishing', publishing_since = ? \
         WHERE draft_id = ? AND status = 'approved'",
    )
    .bind(format_ts(Utc::now()))
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record publish success atomically with the `published` transition
pub async fn record_published(
    pool: &SqlitePool,
    draft_id: Uuid,
    external_id: &str,
    external_url: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'published', external_id = ?, external_url = ?, \
         published_at = ?, publishing_since = NULL \
         WHERE draft_id = ? AND status = 'publishing'",
    )
    .bind(external_id)
    .bind(external_url)
    .bind(format_ts(Utc::now()))
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record publish failure: park in `failed`, bump the retry counter, and
/// remember whether the failure class allows a retry
pub async fn record_publish_failure(
    pool: &SqlitePool,
    draft_id: Uuid,
    error: &str,
    retry_eligible: bool,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'failed', last_error = ?, retry_eligible = ?, \
         retry_count = retry_count + 1, publishing_since = NULL \
         WHERE draft_id = ? AND status = 'publishing'",
    )
    .bind(error)
    .bind(retry_eligible as i64)
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Re-queue a failed draft for publishing. Guards (failed, retry-eligible,
/// below ceiling) are re-checked inside the conditional write.
pub async fn requeue_retry(pool: &SqlitePool, draft_id: Uuid, ceiling: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'approved' \
         WHERE draft_id = ? AND status = 'failed' AND retry_eligible = 1 AND retry_count < ?",
    )
    .bind(draft_id.to_string())
    .bind(ceiling)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Administrative re-open: clear the message reference (and expiry stamp)
/// on a pending draft so the poller surfaces it again
pub async fn clear_message_ref(pool: &SqlitePool, draft_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE drafts SET message_ref = NULL, surfaced_at = NULL, expired_at = NULL \
         WHERE draft_id = ? AND status = 'pending'",
    )
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Counts per status for the administrative status surface
pub async fn status_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM drafts GROUP BY status ORDER BY status")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
        .collect())
}
