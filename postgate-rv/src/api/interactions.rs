//! Inbound Discord interaction events
//!
//! Discord requires an acknowledgement within its interactivity timeout, so
//! the handler validates the payload, responds with a deferred update
//! immediately, and completes the decision asynchronously. The outcome
//! (including a stale-decision loss) is surfaced back to the channel by the
//! spawned task, never by the HTTP response.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use postgate_common::db::models::Decision;

use super::AppState;
use crate::error::{Error, Result};
use crate::surface::discord::parse_custom_id;

// Discord interaction types
const INTERACTION_PING: u8 = 1;
const INTERACTION_MESSAGE_COMPONENT: u8 = 3;

// Discord interaction response types
const RESPONSE_PONG: u8 = 1;
const RESPONSE_DEFERRED_UPDATE: u8 = 6;

#[derive(Debug, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionData {
    pub custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub username: String,
}

impl Interaction {
    /// The acting reviewer's identity (guild interactions nest it under
    /// `member`, DMs put it at the top level)
    fn actor(&self) -> Option<&str> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
            .map(|u| u.username.as_str())
    }
}

/// POST /api/interactions
pub async fn receive(
    State(state): State<AppState>,
    Json(interaction): Json<Interaction>,
) -> Result<Json<Value>> {
    if interaction.kind == INTERACTION_PING {
        return Ok(Json(json!({ "type": RESPONSE_PONG })));
    }

    if interaction.kind != INTERACTION_MESSAGE_COMPONENT {
        return Err(Error::Submission(format!(
            "unsupported interaction type {}",
            interaction.kind
        )));
    }

    let custom_id = interaction
        .data
        .as_ref()
        .and_then(|d| d.custom_id.as_deref())
        .ok_or_else(|| Error::Submission("interaction has no custom_id".to_string()))?;

    let (decision, draft_id) = parse_custom_id(custom_id)
        .ok_or_else(|| Error::Submission(format!("unrecognized custom_id: {}", custom_id)))?;

    let actor = interaction
        .actor()
        .unwrap_or("unknown-reviewer")
        .to_string();

    debug!("Interaction: {} wants to {} draft {}", actor, decision, draft_id);

    // Decision processing happens after the acknowledgement is on the wire
    let workflow = state.workflow.clone();
    tokio::spawn(async move {
        process_decision(workflow, draft_id, decision, actor).await;
    });

    Ok(Json(json!({ "type": RESPONSE_DEFERRED_UPDATE })))
}

/// Complete a button decision and surface the outcome to the channel.
///
/// Buttons carry no free-text rationale, so decline and edit get a default
/// one naming the control that was used.
async fn process_decision(
    workflow: std::sync::Arc<crate::workflow::Workflow>,
    draft_id: Uuid,
    decision: Decision,
    actor: String,
) {
    let rationale = match decision {
        Decision::Approve => None,
        Decision::Decline => Some("declined via review button"),
        Decision::Edit => Some("edit requested via review button"),
    };

    match workflow.decide(draft_id, decision, &actor, rationale).await {
        Ok(_) => {
            if matches!(decision, Decision::Approve) {
                if let Err(e) = workflow.publish(draft_id).await {
                    warn!("Publish after approval of {} failed: {}", draft_id, e);
                }
            }
        }
        Err(Error::StaleDecision { decided_by, .. }) => {
            // The loser learns who won; the draft is untouched
            let winner = decided_by.unwrap_or_else(|| "someone else".to_string());
            warn!("Stale decision on {} by {}: already decided by {}", draft_id, actor, winner);
            let text = format!(
                "{}: draft {} was already decided by {}",
                actor, draft_id, winner
            );
            if let Err(e) = workflow.surface_ref().notify(&text).await {
                warn!("Stale decision notification failed: {}", e);
            }
        }
        Err(e) => {
            warn!("Decision on {} by {} failed: {}", draft_id, actor, e);
        }
    }
}
