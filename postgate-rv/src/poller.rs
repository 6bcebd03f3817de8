//! Background reconciliation poller
//!
//! One tick runs four sweeps against the database:
//!   1. surface pending drafts that have no review message, oldest first
//!   2. publish approved drafts that never reached the external API
//!      (crash recovery for the decision-time publish)
//!   3. expire surfaced drafts whose decision window elapsed
//!   4. fail drafts stuck in the publishing claim (crashed mid-publish)
//!
//! Every sweep is idempotent: the conditional writes underneath make a
//! repeated or overlapping tick a no-op, so the poller never needs a lock.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use postgate_common::db::drafts;

use crate::error::Result;
use crate::workflow::Workflow;

pub struct Poller {
    workflow: Arc<Workflow>,
    interval: Duration,
}

impl Poller {
    pub fn new(workflow: Arc<Workflow>, interval: Duration) -> Self {
        Self { workflow, interval }
    }

    /// Run forever, ticking at the configured interval. Sweep errors are
    /// logged and the loop continues; a database outage on one tick must
    /// not kill the poller.
    pub async fn run(self) {
        info!("Poller started (interval: {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Poll tick failed: {}", e);
            }
        }
    }

    /// One full reconciliation pass. Public so tests can drive the poller
    /// deterministically without the timer.
    pub async fn tick(&self) -> Result<()> {
        self.sweep_surface().await?;
        self.sweep_publish().await?;
        self.sweep_expiry().await?;
        self.sweep_stuck_publishing().await?;
        Ok(())
    }

    /// Surface pending drafts FIFO. A delivery failure defers only the
    /// failed item to the next tick; the rest of the sweep continues, so
    /// one undeliverable draft cannot starve the queue.
    async fn sweep_surface(&self) -> Result<()> {
        let eligible = drafts::pending_unsurfaced(self.workflow.db()).await?;
        for draft in eligible {
            match self.workflow.surface(&draft).await {
                Ok(true) => {}
                Ok(false) => debug!("Draft {} surfaced by a concurrent claim", draft.draft_id),
                Err(e) => {
                    warn!("Surfacing draft {} failed, skipping for this tick: {}", draft.draft_id, e);
                }
            }
        }
        Ok(())
    }

    /// Publish approved drafts that have no external id yet. Normally the
    /// decision handler publishes inline; this sweep catches drafts whose
    /// inline publish never ran (restart between decision and publish).
    async fn sweep_publish(&self) -> Result<()> {
        let eligible = drafts::approved_unpublished(self.workflow.db()).await?;
        for draft in eligible {
            if let Err(e) = self.workflow.publish(draft.draft_id).await {
                warn!("Reconciliation publish of {} failed: {}", draft.draft_id, e);
            }
        }
        Ok(())
    }

    /// Expire surfaced pending drafts past the decision window.
    async fn sweep_expiry(&self) -> Result<()> {
        let cutoff = self.workflow.expiry_cutoff();
        let elapsed = drafts::surfaced_pending_before(self.workflow.db(), cutoff).await?;
        for draft in elapsed {
            if let Err(e) = self.workflow.expire(&draft).await {
                warn!("Expiring draft {} failed: {}", draft.draft_id, e);
            }
        }
        Ok(())
    }

    /// Fail drafts whose publishing claim outlived twice the publish
    /// timeout. The holder either crashed or its result write will lose
    /// the conditional update once we move the draft to failed, so the
    /// retry path stays safe either way.
    async fn sweep_stuck_publishing(&self) -> Result<()> {
        let grace = chrono::Duration::from_std(self.workflow.config().publish_timeout * 2)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let cutoff = chrono::Utc::now() - grace;
        let stuck = drafts::publishing_stale_before(self.workflow.db(), cutoff).await?;
        for draft in stuck {
            warn!("Draft {} stuck in publishing claim, marking failed", draft.draft_id);
            drafts::record_publish_failure(
                self.workflow.db(),
                draft.draft_id,
                "publish attempt did not complete",
                true,
            )
            .await?;
        }
        Ok(())
    }
}
