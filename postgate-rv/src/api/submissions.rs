//! Intake form submission endpoints
//!
//! A submission is the raw form data from the intake surface. It is
//! persisted first, then forwarded to the generation webhook; a webhook
//! failure leaves the row pending with the error recorded, so the form data
//! is never lost to a flaky pipeline. The generation side calls back with
//! the produced draft content.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use postgate_common::db::models::{NewDraft, Submission};
use postgate_common::db::submissions;
use postgate_common::events::PostgateEvent;

use super::AppState;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub form_data: serde_json::Value,
    pub source: Option<String>,
}

/// POST /api/submissions - persist and forward an intake submission
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<Submission>)> {
    if !request.form_data.is_object() {
        return Err(Error::Submission("form_data must be a JSON object".to_string()));
    }

    let source = request.source.as_deref().unwrap_or("web-form");
    let submission = submissions::create_submission(&state.db, &request.form_data, source).await?;

    info!("Submission {} received from {}", submission.submission_id, source);
    let _ = state.events.send(PostgateEvent::SubmissionReceived {
        submission_id: submission.submission_id,
        source: source.to_string(),
        timestamp: Utc::now(),
    });

    // Forward to the generation webhook off the request path; the row is
    // already durable either way
    let forwarded = forward_to_generation(&state, &submission).await;
    if let Err(e) = forwarded {
        warn!("Forwarding submission {} failed: {}", submission.submission_id, e);
        submissions::record_forward_error(&state.db, submission.submission_id, &e.to_string())
            .await?;
    } else {
        submissions::mark_processing(&state.db, submission.submission_id).await?;
    }

    let submission = submissions::get_submission(&state.db, submission.submission_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("submission {}", submission.submission_id)))?;

    Ok((StatusCode::CREATED, Json(submission)))
}

async fn forward_to_generation(state: &AppState, submission: &Submission) -> Result<()> {
    let Some(url) = &state.generation_webhook_url else {
        return Err(Error::Internal("no generation webhook configured".to_string()));
    };

    let response = state
        .http
        .post(url)
        .json(&json!({
            "submission_id": submission.submission_id,
            "form_data": submission.form_data,
            "source": submission.source,
        }))
        .send()
        .await
        .map_err(|e| Error::Internal(format!("webhook unreachable: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Internal(format!("webhook returned {}", status)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct GenerationCallbackRequest {
    /// Generated draft content; absent when generation failed
    pub body: Option<String>,
    pub media_ref: Option<String>,
    pub tags: Option<serde_json::Value>,
    /// Generation failure description
    pub error: Option<String>,
}

/// POST /api/submissions/:submission_id/draft - generation pipeline callback
///
/// Creates the draft through the same submit path as every other entry
/// point and settles the submission. A failed generation settles it as
/// failed with the reported error.
pub async fn generation_callback(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
    Json(request): Json<GenerationCallbackRequest>,
) -> Result<Json<Submission>> {
    if submissions::get_submission(&state.db, submission_id).await?.is_none() {
        return Err(Error::NotFound(format!("submission {}", submission_id)));
    }

    match (request.body, request.error) {
        (Some(body), _) => {
            let draft = state
                .workflow
                .submit(NewDraft {
                    body,
                    media_ref: request.media_ref,
                    tags: request.tags,
                    source: Some(format!("submission:{}", submission_id)),
                })
                .await?;

            if !submissions::mark_completed(&state.db, submission_id, draft.draft_id).await? {
                // The draft exists regardless; a settled submission only
                // loses the linkage
                warn!("Submission {} was already settled", submission_id);
            }
        }
        (None, Some(error)) => {
            submissions::mark_failed(&state.db, submission_id, &error).await?;
            info!("Submission {} failed in generation: {}", submission_id, error);
        }
        (None, None) => {
            return Err(Error::Submission(
                "callback needs either a body or an error".to_string(),
            ));
        }
    }

    submissions::get_submission(&state.db, submission_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("submission {}", submission_id)))
        .map(Json)
}
