//! End-to-end workflow tests against mock surface and publisher adapters
//!
//! These exercise the safety properties of the approval pipeline: exactly
//! one review message per draft, exactly one recorded decision, exactly one
//! external publish per approval, immutable terminal states, the bounded
//! retry, FIFO surfacing, and edit semantics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use postgate_common::db::init::create_tables;
use postgate_common::db::models::{Decision, Draft, DraftStatus, NewDraft};
use postgate_common::db::{drafts, settings};
use postgate_common::events::event_channel;

use postgate_rv::error::Error;
use postgate_rv::poller::Poller;
use postgate_rv::publisher::{PublishApi, PublishFailure, PublishedPost};
use postgate_rv::surface::{MessageHandle, ReviewSurface};
use postgate_rv::workflow::{Workflow, WorkflowConfig};

/// Recording surface double: every render gets a fresh message id, and all
/// calls are captured for assertions.
#[derive(Default)]
struct MockSurface {
    render_count: AtomicUsize,
    rendered_drafts: Mutex<Vec<Uuid>>,
    disabled: Mutex<Vec<MessageHandle>>,
    updates: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
    fail_render: AtomicBool,
    /// Render fails for this draft only (undeliverable content)
    fail_draft: Mutex<Option<Uuid>>,
}

#[async_trait]
impl ReviewSurface for MockSurface {
    async fn render(&self, draft: &Draft) -> postgate_rv::Result<MessageHandle> {
        if self.fail_render.load(Ordering::SeqCst) {
            return Err(Error::SurfaceDelivery("channel unreachable".to_string()));
        }
        if *self.fail_draft.lock().unwrap() == Some(draft.draft_id) {
            return Err(Error::SurfaceDelivery("message rejected".to_string()));
        }
        let n = self.render_count.fetch_add(1, Ordering::SeqCst);
        self.rendered_drafts.lock().unwrap().push(draft.draft_id);
        Ok(MessageHandle {
            channel_id: "review".to_string(),
            message_id: format!("msg-{}", n),
        })
    }

    async fn disable(&self, handle: &MessageHandle) -> postgate_rv::Result<()> {
        self.disabled.lock().unwrap().push(handle.clone());
        Ok(())
    }

    async fn update(&self, _handle: &MessageHandle, summary: &str) -> postgate_rv::Result<()> {
        self.updates.lock().unwrap().push(summary.to_string());
        Ok(())
    }

    async fn notify(&self, text: &str) -> postgate_rv::Result<()> {
        self.notifications.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Scripted publisher double: pops outcomes from a queue, succeeding with a
/// fresh id once the script runs dry.
#[derive(Default)]
struct MockPublisher {
    publish_count: AtomicUsize,
    script: Mutex<VecDeque<Result<PublishedPost, PublishFailure>>>,
}

impl MockPublisher {
    fn scripted(outcomes: Vec<Result<PublishedPost, PublishFailure>>) -> Self {
        Self {
            publish_count: AtomicUsize::new(0),
            script: Mutex::new(outcomes.into()),
        }
    }

    fn always_failing(failure: PublishFailure) -> Self {
        // An empty script succeeds, so pre-load generously
        Self::scripted((0..16).map(|_| Err(failure.clone())).collect())
    }
}

#[async_trait]
impl PublishApi for MockPublisher {
    async fn publish(
        &self,
        _body: &str,
        _media_ref: Option<&str>,
    ) -> Result<PublishedPost, PublishFailure> {
        let n = self.publish_count.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(PublishedPost {
                external_id: format!("urn:li:share:{}", n),
                url: None,
            }),
        }
    }
}

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    create_tables(&pool).await.unwrap();
    pool
}

fn test_config() -> WorkflowConfig {
    WorkflowConfig {
        decision_window: chrono::Duration::hours(24),
        retry_ceiling: 3,
        auto_decline_on_expiry: false,
        max_post_length: 3000,
        surface_timeout: Duration::from_secs(5),
        publish_timeout: Duration::from_secs(5),
    }
}

struct Harness {
    pool: SqlitePool,
    surface: Arc<MockSurface>,
    publisher: Arc<MockPublisher>,
    workflow: Arc<Workflow>,
}

impl Harness {
    async fn new(publisher: MockPublisher, config: WorkflowConfig) -> Self {
        let pool = memory_pool().await;
        let surface = Arc::new(MockSurface::default());
        let publisher = Arc::new(publisher);
        let workflow = Arc::new(Workflow::new(
            pool.clone(),
            surface.clone(),
            publisher.clone(),
            event_channel(),
            config,
        ));
        Self { pool, surface, publisher, workflow }
    }

    async fn default() -> Self {
        Self::new(MockPublisher::default(), test_config()).await
    }

    async fn submit(&self, body: &str) -> Draft {
        self.workflow
            .submit(NewDraft {
                body: body.to_string(),
                media_ref: None,
                tags: None,
                source: Some("test".to_string()),
            })
            .await
            .unwrap()
    }

    fn poller(&self) -> Poller {
        Poller::new(self.workflow.clone(), Duration::from_secs(30))
    }

    async fn reload(&self, draft_id: Uuid) -> Draft {
        drafts::get_draft(&self.pool, draft_id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_submit_validation() {
    let h = Harness::default().await;

    let err = h
        .workflow
        .submit(NewDraft {
            body: "   ".to_string(),
            media_ref: None,
            tags: None,
            source: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Submission(_)));

    let err = h
        .workflow
        .submit(NewDraft {
            body: "x".repeat(3001),
            media_ref: None,
            tags: None,
            source: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Submission(_)));

    // Rejected content leaves no row behind
    assert!(drafts::pending_unsurfaced(&h.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_draft_is_surfaced_exactly_once() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;

    let (a, b) = tokio::join!(h.workflow.surface(&draft), h.workflow.surface(&draft));
    let wins = [a.unwrap(), b.unwrap()];
    assert_eq!(wins.iter().filter(|w| **w).count(), 1, "exactly one surfacing must win");
    assert_eq!(h.surface.render_count.load(Ordering::SeqCst), 1);

    // Repeated poll ticks change nothing
    h.poller().tick().await.unwrap();
    h.poller().tick().await.unwrap();
    assert_eq!(h.surface.render_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_render_failure_leaves_draft_pending_for_next_tick() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;

    h.surface.fail_render.store(true, Ordering::SeqCst);
    let err = h.workflow.surface(&draft).await.unwrap_err();
    assert!(matches!(err, Error::SurfaceDelivery(_)));

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Pending);
    assert!(loaded.message_ref.is_none(), "failed surfacing must release its claim");

    // Recovery on a later tick
    h.surface.fail_render.store(false, Ordering::SeqCst);
    h.poller().tick().await.unwrap();
    assert!(h.reload(draft.draft_id).await.is_surfaced());
}

#[tokio::test]
async fn test_second_decision_is_stale() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();

    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    let err = h
        .workflow
        .decide(draft.draft_id, Decision::Decline, "bob", Some("no"))
        .await
        .unwrap_err();
    match err {
        Error::StaleDecision { decided_by, .. } => {
            assert_eq!(decided_by.as_deref(), Some("alice"));
        }
        other => panic!("expected StaleDecision, got {:?}", other),
    }

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Approved);
    assert_eq!(loaded.decided_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_decline_requires_rationale() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;

    let err = h
        .workflow
        .decide(draft.draft_id, Decision::Decline, "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Submission(_)));

    // The draft is untouched and a valid decision still lands
    h.workflow
        .decide(draft.draft_id, Decision::Decline, "alice", Some("off brand"))
        .await
        .unwrap();
    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Declined);
    assert_eq!(loaded.decision_rationale.as_deref(), Some("off brand"));
}

#[tokio::test]
async fn test_approved_draft_publishes_exactly_once() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();
    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.workflow.publish(draft.draft_id),
        h.workflow.publish(draft.draft_id)
    );
    let published = [a.unwrap(), b.unwrap()];
    assert_eq!(published.iter().filter(|p| p.is_some()).count(), 1);
    assert_eq!(h.publisher.publish_count.load(Ordering::SeqCst), 1);

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Published);
    assert!(loaded.external_id.is_some());

    // The reconciliation sweep must not publish again
    h.poller().tick().await.unwrap();
    assert_eq!(h.publisher.publish_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_terminal_states_are_immutable() {
    let h = Harness::default().await;

    // Published draft: no further decisions
    let published = h.submit("published").await;
    h.workflow.surface(&published).await.unwrap();
    h.workflow
        .decide(published.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();
    h.workflow.publish(published.draft_id).await.unwrap();

    let err = h
        .workflow
        .decide(published.draft_id, Decision::Decline, "bob", Some("regret"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StaleDecision { .. }));
    assert_eq!(h.reload(published.draft_id).await.status, DraftStatus::Published);

    // Declined draft: no publish, no retry, no reopen
    let declined = h.submit("declined").await;
    h.workflow
        .decide(declined.draft_id, Decision::Decline, "alice", Some("off brand"))
        .await
        .unwrap();

    assert!(h.workflow.publish(declined.draft_id).await.unwrap().is_none());
    assert!(matches!(
        h.workflow.retry(declined.draft_id).await.unwrap_err(),
        Error::InvalidState { .. }
    ));
    assert!(matches!(
        h.workflow.reopen(declined.draft_id).await.unwrap_err(),
        Error::InvalidState { .. }
    ));
    assert_eq!(h.reload(declined.draft_id).await.status, DraftStatus::Declined);
}

#[tokio::test]
async fn test_retry_is_bounded_by_ceiling() {
    let h = Harness::new(
        MockPublisher::always_failing(PublishFailure::transient("rate limited")),
        test_config(),
    )
    .await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();
    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    // Attempt 1 fails, then two manual retries fail
    h.workflow.publish(draft.draft_id).await.unwrap();
    for _ in 0..2 {
        h.workflow.retry(draft.draft_id).await.unwrap();
        h.workflow.publish(draft.draft_id).await.unwrap();
    }

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Failed);
    assert_eq!(loaded.retry_count, 3);
    assert!(loaded.retry_eligible);

    let err = h.workflow.retry(draft.draft_id).await.unwrap_err();
    assert!(matches!(err, Error::RetryExhausted { retry_count: 3, .. }));
    assert_eq!(h.publisher.publish_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retryable() {
    let h = Harness::new(
        MockPublisher::scripted(vec![Err(PublishFailure::permanent("rejected by platform"))]),
        test_config(),
    )
    .await;
    let draft = h.submit("hello").await;
    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();
    h.workflow.publish(draft.draft_id).await.unwrap();

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Failed);
    assert!(!loaded.retry_eligible);
    assert_eq!(loaded.retry_count, 1);

    let err = h.workflow.retry(draft.draft_id).await.unwrap_err();
    assert!(matches!(err, Error::RetryNotEligible { .. }));
}

#[tokio::test]
async fn test_poller_surfaces_fifo() {
    let h = Harness::default().await;
    let a = h.submit("a").await;
    let b = h.submit("b").await;
    let c = h.submit("c").await;

    // Force distinct, ordered creation timestamps
    for (i, id) in [a.draft_id, b.draft_id, c.draft_id].iter().enumerate() {
        sqlx::query("UPDATE drafts SET created_at = ? WHERE draft_id = ?")
            .bind(format!("2026-08-30T00:00:0{}.000000Z", i))
            .bind(id.to_string())
            .execute(&h.pool)
            .await
            .unwrap();
    }

    h.poller().tick().await.unwrap();

    let order = h.surface.rendered_drafts.lock().unwrap().clone();
    assert_eq!(order, vec![a.draft_id, b.draft_id, c.draft_id]);
}

#[tokio::test]
async fn test_undeliverable_draft_does_not_starve_younger_drafts() {
    let h = Harness::default().await;
    let stuck = h.submit("undeliverable").await;
    let healthy = h.submit("healthy").await;

    // The undeliverable draft is the older of the two
    for (i, id) in [stuck.draft_id, healthy.draft_id].iter().enumerate() {
        sqlx::query("UPDATE drafts SET created_at = ? WHERE draft_id = ?")
            .bind(format!("2026-08-30T00:00:0{}.000000Z", i))
            .bind(id.to_string())
            .execute(&h.pool)
            .await
            .unwrap();
    }

    *h.surface.fail_draft.lock().unwrap() = Some(stuck.draft_id);
    for _ in 0..5 {
        h.poller().tick().await.unwrap();
    }

    // The younger draft surfaced despite the older one failing every tick
    assert!(h.reload(healthy.draft_id).await.is_surfaced());
    let loaded = h.reload(stuck.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Pending);
    assert!(loaded.message_ref.is_none());

    // Once deliverable, the stuck draft catches up
    *h.surface.fail_draft.lock().unwrap() = None;
    h.poller().tick().await.unwrap();
    assert!(h.reload(stuck.draft_id).await.is_surfaced());
}

#[tokio::test]
async fn test_edit_keeps_draft_pending_without_resurfacing() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();
    let message_ref = h.reload(draft.draft_id).await.message_ref;

    h.workflow
        .decide(draft.draft_id, Decision::Edit, "alice", Some("tighten the hook"))
        .await
        .unwrap();

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Pending);
    assert_eq!(loaded.decided_by.as_deref(), Some("alice"));
    assert_eq!(loaded.message_ref, message_ref, "edit must keep the review message");

    // The poller must not render it a second time
    h.poller().tick().await.unwrap();
    assert_eq!(h.surface.render_count.load(Ordering::SeqCst), 1);

    // A later decision on the revised content is still allowed
    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();
    assert_eq!(h.reload(draft.draft_id).await.status, DraftStatus::Approved);
}

#[tokio::test]
async fn test_reopen_resurfaces_with_fresh_message() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();

    h.workflow.reopen(draft.draft_id).await.unwrap();
    let loaded = h.reload(draft.draft_id).await;
    assert!(loaded.message_ref.is_none());
    assert!(loaded.surfaced_at.is_none());

    // Old message's controls go away; next tick renders a new message
    assert_eq!(h.surface.disabled.lock().unwrap().len(), 1);
    h.poller().tick().await.unwrap();
    assert_eq!(h.surface.render_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expiry_disables_decisions_but_keeps_status() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();

    // Age the surfacing past the decision window
    sqlx::query("UPDATE drafts SET surfaced_at = ? WHERE draft_id = ?")
        .bind("2020-01-01T00:00:00.000000Z")
        .bind(draft.draft_id.to_string())
        .execute(&h.pool)
        .await
        .unwrap();

    h.poller().tick().await.unwrap();

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Pending, "expiry must not change status by default");
    assert!(loaded.expired_at.is_some());
    assert_eq!(h.surface.disabled.lock().unwrap().len(), 1);

    // Late decisions lose
    let err = h
        .workflow
        .decide(draft.draft_id, Decision::Approve, "late", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StaleDecision { .. }));

    // Expiry is recorded once; further ticks are no-ops
    h.poller().tick().await.unwrap();
    assert_eq!(h.surface.disabled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_expiry_auto_decline_policy() {
    let config = WorkflowConfig {
        auto_decline_on_expiry: true,
        ..test_config()
    };
    let h = Harness::new(MockPublisher::default(), config).await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();

    sqlx::query("UPDATE drafts SET surfaced_at = ? WHERE draft_id = ?")
        .bind("2020-01-01T00:00:00.000000Z")
        .bind(draft.draft_id.to_string())
        .execute(&h.pool)
        .await
        .unwrap();

    h.poller().tick().await.unwrap();

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Declined);
    assert_eq!(loaded.decided_by.as_deref(), Some("postgate:expiry"));
}

#[tokio::test]
async fn test_poller_reconciles_approved_unpublished() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow.surface(&draft).await.unwrap();

    // Simulate a decision whose inline publish never ran (restart)
    drafts::record_decision(&h.pool, draft.draft_id, DraftStatus::Approved, "alice", None)
        .await
        .unwrap();

    h.poller().tick().await.unwrap();

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Published);
    assert_eq!(h.publisher.publish_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stuck_publishing_is_reparked_as_transient_failure() {
    let h = Harness::default().await;
    let draft = h.submit("hello").await;
    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();
    drafts::claim_publishing(&h.pool, draft.draft_id).await.unwrap();

    // Age the claim well past the grace period
    sqlx::query("UPDATE drafts SET publishing_since = ? WHERE draft_id = ?")
        .bind("2020-01-01T00:00:00.000000Z")
        .bind(draft.draft_id.to_string())
        .execute(&h.pool)
        .await
        .unwrap();

    h.poller().tick().await.unwrap();

    let loaded = h.reload(draft.draft_id).await;
    assert_eq!(loaded.status, DraftStatus::Failed);
    assert!(loaded.retry_eligible);

    // And the operator can get it going again
    h.workflow.retry(draft.draft_id).await.unwrap();
    h.workflow.publish(draft.draft_id).await.unwrap();
    assert_eq!(h.reload(draft.draft_id).await.status, DraftStatus::Published);
}

#[tokio::test]
async fn test_publish_success_and_failure_notify_channel() {
    let h = Harness::new(
        MockPublisher::scripted(vec![
            Err(PublishFailure::transient("rate limited")),
            Ok(PublishedPost {
                external_id: "urn:li:share:42".to_string(),
                url: Some("https://example.com/42".to_string()),
            }),
        ]),
        test_config(),
    )
    .await;
    let draft = h.submit("hello").await;
    h.workflow
        .decide(draft.draft_id, Decision::Approve, "alice", None)
        .await
        .unwrap();

    h.workflow.publish(draft.draft_id).await.unwrap();
    h.workflow.retry(draft.draft_id).await.unwrap();
    h.workflow.publish(draft.draft_id).await.unwrap();

    let notifications = h.surface.notifications.lock().unwrap().clone();
    assert_eq!(notifications.len(), 2);
    assert!(notifications[0].contains("retry available"));
    assert!(notifications[1].contains("https://example.com/42"));
}

#[tokio::test]
async fn test_workflow_config_loads_from_settings() {
    let pool = memory_pool().await;
    postgate_common::db::init::init_default_settings(&pool).await.unwrap();
    settings::set_setting(&pool, "decision_window_hours", "48").await.unwrap();
    settings::set_setting(&pool, "publish_retry_ceiling", "5").await.unwrap();

    let config = WorkflowConfig::from_settings(&pool).await.unwrap();
    assert_eq!(config.decision_window, chrono::Duration::hours(48));
    assert_eq!(config.retry_ceiling, 5);
    assert!(!config.auto_decline_on_expiry);
}
