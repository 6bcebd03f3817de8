//! Workflow event types
//!
//! Events are broadcast on a `tokio::sync::broadcast` channel and serialized
//! for SSE transmission to administrative clients. They are observability
//! only; no correctness decision may depend on receiving one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::models::Decision;

/// Postgate workflow events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PostgateEvent {
    /// A draft entered the pipeline
    DraftCreated {
        draft_id: Uuid,
        source: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A draft was rendered to the review channel
    DraftSurfaced {
        draft_id: Uuid,
        message_ref: String,
        timestamp: DateTime<Utc>,
    },

    /// A reviewer decision was recorded
    DecisionRecorded {
        draft_id: Uuid,
        decision: Decision,
        decided_by: String,
        timestamp: DateTime<Utc>,
    },

    /// The decision window elapsed; controls were disabled
    DraftExpired {
        draft_id: Uuid,
        auto_declined: bool,
        timestamp: DateTime<Utc>,
    },

    /// Publication succeeded
    DraftPublished {
        draft_id: Uuid,
        external_id: String,
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Publication failed; draft parked in `failed`
    PublishFailed {
        draft_id: Uuid,
        error: String,
        retry_eligible: bool,
        retry_count: i64,
        timestamp: DateTime<Utc>,
    },

    /// A failed draft was manually re-queued for publishing
    RetryRequeued {
        draft_id: Uuid,
        retry_count: i64,
        timestamp: DateTime<Utc>,
    },

    /// An intake form submission was received
    SubmissionReceived {
        submission_id: Uuid,
        source: String,
        timestamp: DateTime<Utc>,
    },
}

impl PostgateEvent {
    /// Event type name for SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PostgateEvent::DraftCreated { .. } => "DraftCreated",
            PostgateEvent::DraftSurfaced { .. } => "DraftSurfaced",
            PostgateEvent::DecisionRecorded { .. } => "DecisionRecorded",
            PostgateEvent::DraftExpired { .. } => "DraftExpired",
            PostgateEvent::DraftPublished { .. } => "DraftPublished",
            PostgateEvent::PublishFailed { .. } => "PublishFailed",
            PostgateEvent::RetryRequeued { .. } => "RetryRequeued",
            PostgateEvent::SubmissionReceived { .. } => "SubmissionReceived",
        }
    }
}

/// Create the workflow event channel (buffer sized for slow SSE consumers)
pub fn event_channel() -> broadcast::Sender<PostgateEvent> {
    let (tx, _) = broadcast::channel(100);
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PostgateEvent::DecisionRecorded {
            draft_id: Uuid::new_v4(),
            decision: Decision::Approve,
            decided_by: "alice".to_string(),
            timestamp: Utc::now(),
        };

        assert_eq!(event.event_type(), "DecisionRecorded");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"DecisionRecorded\""));
        assert!(json.contains("\"decision\":\"approve\""));

        let back: PostgateEvent = serde_json::from_str(&json).unwrap();
        match back {
            PostgateEvent::DecisionRecorded { decided_by, .. } => {
                assert_eq!(decided_by, "alice");
            }
            _ => panic!("wrong event type deserialized"),
        }
    }
}
