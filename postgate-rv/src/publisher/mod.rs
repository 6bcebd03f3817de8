//! Publishing abstraction
//!
//! The external social API is a black box behind the `PublishApi` trait:
//! given content, it returns a published identifier (and canonical URL) or
//! a classified failure.

pub mod linkedin;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub use linkedin::LinkedInPublisher;

/// Result of a successful publish call
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub external_id: String,
    pub url: Option<String>,
}

/// Failure classification driving retry eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, rate limits, 5xx: eligible for manual retry
    Transient,
    /// Validation rejection, authorization failure: needs human remediation
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => f.write_str("transient"),
            FailureKind::Permanent => f.write_str("permanent"),
        }
    }
}

/// Classified publish failure
#[derive(Debug, Clone, Error)]
#[error("{kind} publish failure: {message}")]
pub struct PublishFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PublishFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Permanent, message: message.into() }
    }

    pub fn is_retry_eligible(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// External publish API seam
#[async_trait]
pub trait PublishApi: Send + Sync {
    /// Publish content. Invoked at most once per `approved -> published`
    /// transition by the workflow's publishing claim.
    async fn publish(
        &self,
        body: &str,
        media_ref: Option<&str>,
    ) -> std::result::Result<PublishedPost, PublishFailure>;
}
