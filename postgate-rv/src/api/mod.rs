//! REST API for the review service

pub mod drafts;
pub mod interactions;
pub mod sse;
pub mod submissions;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use reqwest::Client;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use postgate_common::events::PostgateEvent;

use crate::workflow::Workflow;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub workflow: Arc<Workflow>,
    pub events: broadcast::Sender<PostgateEvent>,
    /// Outbound HTTP client for forwarding intake submissions
    pub http: Client,
    /// Webhook receiving intake form data for draft generation
    pub generation_webhook_url: Option<String>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api",
            Router::new()
                .route("/status", get(status))
                .route("/drafts", post(drafts::create))
                .route("/drafts/:draft_id", get(drafts::fetch))
                .route("/drafts/:draft_id/retry", post(drafts::retry))
                .route("/drafts/:draft_id/reopen", post(drafts::reopen))
                .route("/interactions", post(interactions::receive))
                .route("/submissions", post(submissions::create))
                .route("/submissions/:submission_id/draft", post(submissions::generation_callback))
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "postgate-rv",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}

/// GET /api/status - counts per draft status
async fn status(
    State(state): State<AppState>,
) -> crate::error::Result<Json<serde_json::Value>> {
    let counts = postgate_common::db::drafts::status_counts(&state.db).await?;
    let counts: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(status, n)| (status, json!(n)))
        .collect();

    Ok(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "drafts": counts,
    })))
}
