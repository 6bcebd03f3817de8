//! Core entity types for the approval pipeline
//!
//! `status` is a closed enum and the sole source of truth for control flow.
//! Timestamp columns (`decided_at`, `published_at`, ...) are derived audit
//! fields only; nothing may infer state from them being set or unset.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Draft lifecycle states.
///
/// `publishing` is the in-flight claim taken by the publisher so that the
/// external API is invoked at most once per approved draft; it is reported
/// by the status surface but is otherwise internal bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Pending,
    Approved,
    Publishing,
    Published,
    Declined,
    Failed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Pending => "pending",
            DraftStatus::Approved => "approved",
            DraftStatus::Publishing => "publishing",
            DraftStatus::Published => "published",
            DraftStatus::Declined => "declined",
            DraftStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(DraftStatus::Pending),
            "approved" => Ok(DraftStatus::Approved),
            "publishing" => Ok(DraftStatus::Publishing),
            "published" => Ok(DraftStatus::Published),
            "declined" => Ok(DraftStatus::Declined),
            "failed" => Ok(DraftStatus::Failed),
            other => Err(Error::Internal(format!("unknown draft status: {}", other))),
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DraftStatus::Published | DraftStatus::Declined)
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reviewer's decision on a surfaced draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Decline,
    Edit,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Decline => "decline",
            Decision::Edit => "edit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Decision::Approve),
            "decline" => Some(Decision::Decline),
            "edit" => Some(Decision::Edit),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intake submission lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "processing" => Ok(SubmissionStatus::Processing),
            "completed" => Ok(SubmissionStatus::Completed),
            "failed" => Ok(SubmissionStatus::Failed),
            other => Err(Error::Internal(format!(
                "unknown submission status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content draft record (the unit moving through the approval pipeline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: Uuid,
    pub body: String,
    pub media_ref: Option<String>,
    /// Generation metadata (industry / audience / theme tags)
    pub tags: Option<serde_json::Value>,
    pub source: Option<String>,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
    pub surfaced_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub decision_rationale: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    /// Encoded handle of the outbound review message; set at most once
    pub message_ref: Option<String>,
    pub retry_count: i64,
    pub retry_eligible: bool,
    pub last_error: Option<String>,
}

impl Draft {
    /// Whether the draft has a real review message (not an in-flight
    /// surfacing claim token).
    pub fn is_surfaced(&self) -> bool {
        self.message_ref
            .as_deref()
            .is_some_and(|r| !r.starts_with(drafts_claim_prefix()))
    }
}

/// Fields supplied when creating a draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDraft {
    pub body: String,
    pub media_ref: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub source: Option<String>,
}

/// Intake form submission record (replaces the source system's process-wide
/// in-progress-form map with a persisted entity)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: Uuid,
    pub form_data: serde_json::Value,
    pub source: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub draft_id: Option<Uuid>,
    pub error_message: Option<String>,
}

/// Prefix marking an in-flight surfacing claim in `message_ref`
pub(crate) fn drafts_claim_prefix() -> &'static str {
    "claim:"
}

/// Format a timestamp for storage.
///
/// Fixed-width RFC 3339 UTC so stored values compare correctly both
/// lexicographically (in SQL) and after parsing.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid stored timestamp '{}': {}", s, e)))
}

/// Parse an optional stored timestamp.
pub fn parse_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}
