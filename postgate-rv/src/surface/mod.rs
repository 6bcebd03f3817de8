//! Reviewer surface abstraction
//!
//! The workflow controller talks to the review channel exclusively through
//! the `ReviewSurface` trait. The adapter absorbs modality differences
//! (buttons today, reactions historically); the controller only ever sees
//! abstract render/disable/update operations and `DecisionEvent`s coming
//! back through the interactions endpoint.

pub mod discord;

use crate::error::Result;
use async_trait::async_trait;
use postgate_common::db::models::Draft;

pub use discord::DiscordSurface;

/// Opaque handle to an outbound review message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

impl MessageHandle {
    /// Encode for storage in the draft's `message_ref` column
    pub fn encode(&self) -> String {
        format!("{}/{}", self.channel_id, self.message_id)
    }

    /// Decode a stored `message_ref`
    pub fn decode(s: &str) -> Option<Self> {
        let (channel_id, message_id) = s.split_once('/')?;
        if channel_id.is_empty() || message_id.is_empty() {
            return None;
        }
        Some(Self {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        })
    }
}

/// Outbound operations against the review channel
#[async_trait]
pub trait ReviewSurface: Send + Sync {
    /// Render a pending draft as an interactive message with the three
    /// decision controls. Returns the handle of the created message.
    async fn render(&self, draft: &Draft) -> Result<MessageHandle>;

    /// Deactivate the decision controls without deleting the message, so
    /// historical context is preserved. Used on decision and on expiry.
    async fn disable(&self, handle: &MessageHandle) -> Result<()>;

    /// Augment the message with the resolved decision and deciding identity.
    async fn update(&self, handle: &MessageHandle, summary: &str) -> Result<()>;

    /// Post an out-of-band announcement (publish success/failure, stale
    /// decision outcomes).
    async fn notify(&self, text: &str) -> Result<()>;
}
