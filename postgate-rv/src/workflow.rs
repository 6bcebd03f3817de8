//! Approval workflow controller
//!
//! Owns every lifecycle transition of a draft. All transitions go through
//! the status-guarded conditional writes in `postgate_common::db::drafts`;
//! this module layers the business rules on top: validation at submission,
//! the surfacing claim protocol, decision semantics (including the stale
//! decision path), expiry policy, publish failure classification, and the
//! bounded manual retry.
//!
//! External delivery (surface render, publish call) runs under a timeout so
//! a hung network call cannot wedge a poll tick. A timeout on the publish
//! call is recorded as a transient failure; a timeout on a render releases
//! the surfacing claim and the next tick retries.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use postgate_common::db::models::{Decision, Draft, DraftStatus, NewDraft};
use postgate_common::db::{drafts, settings};
use postgate_common::events::PostgateEvent;

use crate::error::{Error, Result};
use crate::publisher::PublishApi;
use crate::surface::{MessageHandle, ReviewSurface};

/// Deciding identity recorded for policy-driven auto-declines
const EXPIRY_ACTOR: &str = "postgate:expiry";

/// Workflow tunables, loaded from the settings table at startup
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub decision_window: Duration,
    pub retry_ceiling: i64,
    pub auto_decline_on_expiry: bool,
    pub max_post_length: usize,
    pub surface_timeout: std::time::Duration,
    pub publish_timeout: std::time::Duration,
}

impl WorkflowConfig {
    pub async fn from_settings(pool: &SqlitePool) -> Result<Self> {
        Ok(Self {
            decision_window: Duration::hours(settings::decision_window_hours(pool).await?),
            retry_ceiling: settings::publish_retry_ceiling(pool).await?,
            auto_decline_on_expiry: settings::auto_decline_on_expiry(pool).await?,
            max_post_length: settings::max_post_length(pool).await? as usize,
            surface_timeout: std::time::Duration::from_secs(
                settings::surface_timeout_seconds(pool).await? as u64,
            ),
            publish_timeout: std::time::Duration::from_secs(
                settings::publish_timeout_seconds(pool).await? as u64,
            ),
        })
    }
}

/// The workflow controller shared across the poller and the HTTP handlers
pub struct Workflow {
    db: SqlitePool,
    surface: Arc<dyn ReviewSurface>,
    publisher: Arc<dyn PublishApi>,
    events: broadcast::Sender<PostgateEvent>,
    config: WorkflowConfig,
}

impl Workflow {
    pub fn new(
        db: SqlitePool,
        surface: Arc<dyn ReviewSurface>,
        publisher: Arc<dyn PublishApi>,
        events: broadcast::Sender<PostgateEvent>,
        config: WorkflowConfig,
    ) -> Self {
        Self { db, surface, publisher, events, config }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn surface_ref(&self) -> &dyn ReviewSurface {
        self.surface.as_ref()
    }

    fn emit(&self, event: PostgateEvent) {
        // A send error just means no subscribers right now
        let _ = self.events.send(event);
    }

    /// Create a new pending draft after content validation. Rejected content
    /// never produces a row.
    pub async fn submit(&self, new: NewDraft) -> Result<Draft> {
        let body = new.body.trim();
        if body.is_empty() {
            return Err(Error::Submission("body is empty".to_string()));
        }
        if body.chars().count() > self.config.max_post_length {
            return Err(Error::Submission(format!(
                "body exceeds {} characters",
                self.config.max_post_length
            )));
        }

        let draft = drafts::create_draft(
            &self.db,
            &NewDraft { body: body.to_string(), ..new },
        )
        .await?;

        info!("Draft {} created from {:?}", draft.draft_id, draft.source);
        self.emit(PostgateEvent::DraftCreated {
            draft_id: draft.draft_id,
            source: draft.source.clone(),
            timestamp: Utc::now(),
        });
        Ok(draft)
    }

    /// Surface a pending draft into the review channel, exactly once.
    ///
    /// The claim token goes into `message_ref` before the render call, so a
    /// concurrent surfacing attempt (overlapping poll ticks, multiple
    /// instances) loses the conditional write and skips the draft. Render
    /// failure releases the claim; the draft stays pending and the next
    /// tick retries. Returns `Ok(false)` when the claim was lost.
    pub async fn surface(&self, draft: &Draft) -> Result<bool> {
        let token = format!("claim:{}", Uuid::new_v4());
        if !drafts::claim_surfacing(&self.db, draft.draft_id, &token).await? {
            return Ok(false);
        }

        let rendered = tokio::time::timeout(self.config.surface_timeout, self.surface.render(draft))
            .await
            .map_err(|_| Error::SurfaceDelivery("render timed out".to_string()))
            .and_then(|r| r);

        match rendered {
            Ok(handle) => {
                if !drafts::record_message_ref(&self.db, draft.draft_id, &token, &handle.encode())
                    .await?
                {
                    // Claim vanished under us (admin reopen between render
                    // and record); the orphan message gets its controls
                    // disabled so it cannot collect decisions.
                    warn!("Surfacing claim lost after render for draft {}", draft.draft_id);
                    let _ = self.surface.disable(&handle).await;
                    return Ok(false);
                }
                info!("Draft {} surfaced as {}", draft.draft_id, handle.encode());
                self.emit(PostgateEvent::DraftSurfaced {
                    draft_id: draft.draft_id,
                    message_ref: handle.encode(),
                    timestamp: Utc::now(),
                });
                Ok(true)
            }
            Err(e) => {
                drafts::release_surfacing_claim(&self.db, draft.draft_id, &token).await?;
                Err(e)
            }
        }
    }

    /// Record a reviewer decision.
    ///
    /// Approve needs no rationale; decline and edit-request require one.
    /// The transition is a single conditional write against `pending`; a
    /// losing caller gets `StaleDecision` naming the reviewer who won.
    /// On success the review message's controls are disabled (approve,
    /// decline) or left active-but-annotated (edit), best effort.
    pub async fn decide(
        &self,
        draft_id: Uuid,
        decision: Decision,
        decided_by: &str,
        rationale: Option<&str>,
    ) -> Result<Draft> {
        let rationale = rationale.map(str::trim).filter(|r| !r.is_empty());
        if rationale.is_none() && !matches!(decision, Decision::Approve) {
            return Err(Error::Submission(format!(
                "a rationale is required to {}",
                decision
            )));
        }

        let status_after = match decision {
            Decision::Approve => DraftStatus::Approved,
            Decision::Decline => DraftStatus::Declined,
            // An edit request keeps the draft pending; only the audit
            // fields change
            Decision::Edit => DraftStatus::Pending,
        };

        let won =
            drafts::record_decision(&self.db, draft_id, status_after, decided_by, rationale)
                .await?;
        if !won {
            let current = drafts::get_draft(&self.db, draft_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;
            return Err(Error::StaleDecision {
                draft_id,
                decided_by: current.decided_by,
            });
        }

        let draft = drafts::get_draft(&self.db, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;

        info!("Draft {} {} by {}", draft_id, decision, decided_by);
        self.annotate_decision(&draft, decision, decided_by).await;
        self.emit(PostgateEvent::DecisionRecorded {
            draft_id,
            decision,
            decided_by: decided_by.to_string(),
            timestamp: Utc::now(),
        });

        Ok(draft)
    }

    /// Best-effort review message cleanup after a decision. Failures here
    /// are logged, never surfaced: the decision is already durable.
    async fn annotate_decision(&self, draft: &Draft, decision: Decision, decided_by: &str) {
        let Some(handle) = self.message_handle(draft) else {
            return;
        };

        let summary = match decision {
            Decision::Approve => format!("Approved by {}", decided_by),
            Decision::Decline => format!("Declined by {}", decided_by),
            Decision::Edit => format!("Edit requested by {}", decided_by),
        };

        if let Err(e) = self.surface.update(&handle, &summary).await {
            warn!("Failed to annotate review message for {}: {}", draft.draft_id, e);
        }

        // Edit leaves the controls live so the reviewer can still decide
        // after the content is revised
        if !matches!(decision, Decision::Edit) {
            if let Err(e) = self.surface.disable(&handle).await {
                warn!("Failed to disable review message for {}: {}", draft.draft_id, e);
            }
        }
    }

    /// Expire a surfaced pending draft whose decision window elapsed.
    ///
    /// The expiry stamp disables further decisions. The draft's status is
    /// left pending unless the auto-decline policy is enabled.
    pub async fn expire(&self, draft: &Draft) -> Result<bool> {
        if !drafts::mark_expired(&self.db, draft.draft_id).await? {
            return Ok(false);
        }

        let auto_declined = if self.config.auto_decline_on_expiry {
            drafts::decline_on_expiry(
                &self.db,
                draft.draft_id,
                EXPIRY_ACTOR,
                "decision window elapsed",
            )
            .await?
        } else {
            false
        };

        if let Some(handle) = self.message_handle(draft) {
            if let Err(e) = self.surface.disable(&handle).await {
                warn!("Failed to disable expired review message for {}: {}", draft.draft_id, e);
            }
            let summary = if auto_declined {
                "Review window elapsed, auto-declined"
            } else {
                "Review window elapsed"
            };
            if let Err(e) = self.surface.update(&handle, summary).await {
                warn!("Failed to annotate expired review message for {}: {}", draft.draft_id, e);
            }
        }

        info!(
            "Draft {} expired (auto_declined: {})",
            draft.draft_id, auto_declined
        );
        self.emit(PostgateEvent::DraftExpired {
            draft_id: draft.draft_id,
            auto_declined,
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    /// The expiry cutoff for the surfacing timestamp given the configured
    /// decision window.
    pub fn expiry_cutoff(&self) -> chrono::DateTime<Utc> {
        Utc::now() - self.config.decision_window
    }

    /// Publish an approved draft, exactly once.
    ///
    /// The `approved -> publishing` claim makes this safe to invoke from
    /// both the decision handler and the reconciliation sweep: only one
    /// caller reaches the external API. Returns `Ok(None)` when the claim
    /// was lost, `Ok(Some(draft))` with the published draft on success, and
    /// the draft lands in `failed` (with the failure classified) otherwise.
    pub async fn publish(&self, draft_id: Uuid) -> Result<Option<Draft>> {
        if !drafts::claim_publishing(&self.db, draft_id).await? {
            return Ok(None);
        }

        let draft = drafts::get_draft(&self.db, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;

        let outcome = match tokio::time::timeout(
            self.config.publish_timeout,
            self.publisher.publish(&draft.body, draft.media_ref.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(crate::publisher::PublishFailure::transient(
                "publish call timed out".to_string(),
            )),
        };

        match outcome {
            Ok(post) => {
                if !drafts::record_published(
                    &self.db,
                    draft_id,
                    &post.external_id,
                    post.url.as_deref(),
                )
                .await?
                {
                    return Err(Error::InvalidState {
                        draft_id,
                        expected: "publishing",
                        actual: self.current_status(draft_id).await?,
                    });
                }

                info!("Draft {} published as {}", draft_id, post.external_id);
                self.notify_published(draft_id, post.url.as_deref()).await;
                self.emit(PostgateEvent::DraftPublished {
                    draft_id,
                    external_id: post.external_id,
                    url: post.url.clone(),
                    timestamp: Utc::now(),
                });

                let published = drafts::get_draft(&self.db, draft_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;
                Ok(Some(published))
            }
            Err(failure) => {
                let retry_eligible = failure.is_retry_eligible();
                drafts::record_publish_failure(
                    &self.db,
                    draft_id,
                    &failure.to_string(),
                    retry_eligible,
                )
                .await?;

                warn!("Draft {} publish failed: {}", draft_id, failure);
                self.notify_failed(draft_id, &failure.to_string(), retry_eligible).await;
                self.emit(PostgateEvent::PublishFailed {
                    draft_id,
                    error: failure.to_string(),
                    retry_eligible,
                    retry_count: draft.retry_count + 1,
                    timestamp: Utc::now(),
                });
                Ok(None)
            }
        }
    }

    async fn notify_published(&self, draft_id: Uuid, url: Option<&str>) {
        let text = match url {
            Some(url) => format!("Draft {} published: {}", draft_id, url),
            None => format!("Draft {} published", draft_id),
        };
        if let Err(e) = self.surface.notify(&text).await {
            warn!("Publish notification failed for {}: {}", draft_id, e);
        }
    }

    async fn notify_failed(&self, draft_id: Uuid, error: &str, retry_eligible: bool) {
        let text = if retry_eligible {
            format!("Draft {} failed to publish (retry available): {}", draft_id, error)
        } else {
            format!("Draft {} failed to publish permanently: {}", draft_id, error)
        };
        if let Err(e) = self.surface.notify(&text).await {
            warn!("Failure notification failed for {}: {}", draft_id, e);
        }
    }

    /// Manual retry of a failed publish. Only transient failures below the
    /// attempt ceiling are requeued; the publish itself happens on the next
    /// reconciliation sweep (or an immediate `publish` call by the caller).
    pub async fn retry(&self, draft_id: Uuid) -> Result<Draft> {
        let draft = drafts::get_draft(&self.db, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;

        if draft.status != DraftStatus::Failed {
            return Err(Error::InvalidState {
                draft_id,
                expected: "failed",
                actual: draft.status.to_string(),
            });
        }
        if !draft.retry_eligible {
            return Err(Error::RetryNotEligible { draft_id });
        }
        if draft.retry_count >= self.config.retry_ceiling {
            return Err(Error::RetryExhausted { draft_id, retry_count: draft.retry_count });
        }

        // Guards re-checked inside the conditional write
        if !drafts::requeue_retry(&self.db, draft_id, self.config.retry_ceiling).await? {
            let current = drafts::get_draft(&self.db, draft_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;
            return Err(Error::InvalidState {
                draft_id,
                expected: "failed",
                actual: current.status.to_string(),
            });
        }

        info!("Draft {} requeued for publish retry", draft_id);
        self.emit(PostgateEvent::RetryRequeued {
            draft_id,
            retry_count: draft.retry_count,
            timestamp: Utc::now(),
        });

        drafts::get_draft(&self.db, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))
    }

    /// Administrative re-open of a pending draft: clears the message
    /// reference and expiry stamp so the next poll tick surfaces it afresh
    /// (the path for putting a revised draft back in front of reviewers
    /// after an edit request).
    pub async fn reopen(&self, draft_id: Uuid) -> Result<Draft> {
        let draft = drafts::get_draft(&self.db, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))?;

        if draft.status != DraftStatus::Pending {
            return Err(Error::InvalidState {
                draft_id,
                expected: "pending",
                actual: draft.status.to_string(),
            });
        }

        let old_handle = self.message_handle(&draft);
        if !drafts::clear_message_ref(&self.db, draft_id).await? {
            return Err(Error::InvalidState {
                draft_id,
                expected: "pending",
                actual: self.current_status(draft_id).await?,
            });
        }

        // The superseded message keeps its content but loses its controls
        if let Some(handle) = old_handle {
            if let Err(e) = self.surface.disable(&handle).await {
                warn!("Failed to disable superseded review message for {}: {}", draft_id, e);
            }
        }

        info!("Draft {} reopened for re-surfacing", draft_id);
        drafts::get_draft(&self.db, draft_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("draft {}", draft_id)))
    }

    fn message_handle(&self, draft: &Draft) -> Option<MessageHandle> {
        if !draft.is_surfaced() {
            return None;
        }
        draft.message_ref.as_deref().and_then(MessageHandle::decode)
    }

    async fn current_status(&self, draft_id: Uuid) -> Result<String> {
        Ok(drafts::get_draft(&self.db, draft_id)
            .await?
            .map(|d| d.status.to_string())
            .unwrap_or_else(|| "missing".to_string()))
    }
}
