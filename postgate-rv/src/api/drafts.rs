//! Draft endpoints

use axum::extract::{Path, State};
use axum::response::Json;
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use postgate_common::db::drafts;
use postgate_common::db::models::{Draft, NewDraft};

use super::AppState;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct CreateDraftRequest {
    pub body: String,
    pub media_ref: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub source: Option<String>,
}

/// POST /api/drafts - submit content for review
///
/// Administrative test submissions come through here too; there is no
/// separate path that could drift from production behavior.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<Draft>)> {
    let draft = state
        .workflow
        .submit(NewDraft {
            body: request.body,
            media_ref: request.media_ref,
            tags: request.tags,
            source: request.source.or_else(|| Some("api".to_string())),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(draft)))
}

/// GET /api/drafts/:draft_id
pub async fn fetch(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<Draft>> {
    let draft = drafts::get_draft(&state.db, draft_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;
    Ok(Json(draft))
}

/// POST /api/drafts/:draft_id/retry - requeue a failed publish
///
/// The requeued draft is published immediately rather than waiting for the
/// next reconciliation sweep.
pub async fn retry(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<Draft>> {
    let draft = state.workflow.retry(draft_id).await?;

    let workflow = state.workflow.clone();
    tokio::spawn(async move {
        if let Err(e) = workflow.publish(draft_id).await {
            tracing::warn!("Retry publish of {} failed: {}", draft_id, e);
        }
    });

    Ok(Json(draft))
}

/// POST /api/drafts/:draft_id/reopen - re-surface a pending draft
pub async fn reopen(
    State(state): State<AppState>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<Draft>> {
    let draft = state.workflow.reopen(draft_id).await?;
    Ok(Json(draft))
}
