//! Discord reviewer surface
//!
//! Renders pending drafts into the approval channel as a message with three
//! button components (approve / decline / request-edit) whose custom ids
//! carry the draft id, so inbound interaction events can recover the draft
//! without any process-local mapping surviving restarts.

use async_trait::async_trait;
use postgate_common::db::models::Draft;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{MessageHandle, ReviewSurface};
use crate::error::{Error, Result};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

// Discord button styles
const STYLE_SUCCESS: u8 = 3;
const STYLE_DANGER: u8 = 4;
const STYLE_SECONDARY: u8 = 2;

/// Discord REST implementation of `ReviewSurface`
pub struct DiscordSurface {
    http: Client,
    bot_token: String,
    approval_channel_id: String,
    notification_channel_id: Option<String>,
    base_url: String,
}

impl DiscordSurface {
    pub fn new(
        http: Client,
        bot_token: String,
        approval_channel_id: String,
        notification_channel_id: Option<String>,
    ) -> Self {
        Self {
            http,
            bot_token,
            approval_channel_id,
            notification_channel_id,
            base_url: DISCORD_API_BASE.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// The three decision buttons for a draft
    fn decision_components(draft_id: &str) -> Value {
        json!([{
            "type": 1,
            "components": [
                {
                    "type": 2,
                    "style": STYLE_SUCCESS,
                    "label": "Approve",
                    "custom_id": format!("approve:{}", draft_id),
                },
                {
                    "type": 2,
                    "style": STYLE_DANGER,
                    "label": "Decline",
                    "custom_id": format!("decline:{}", draft_id),
                },
                {
                    "type": 2,
                    "style": STYLE_SECONDARY,
                    "label": "Request Edit",
                    "custom_id": format!("edit:{}", draft_id),
                },
            ],
        }])
    }

    /// Embed carrying the full draft, untruncated; the reviewer must see
    /// everything they are deciding on. The body rides in the embed
    /// description (4096-char limit, which fits any submittable draft)
    /// rather than the message content (2000-char limit, which does not).
    /// Content is left free for the decision summary written by `update`.
    fn render_embed(draft: &Draft) -> Value {
        let mut fields = Vec::new();
        if let Some(media) = &draft.media_ref {
            fields.push(json!({ "name": "Media", "value": media }));
        }
        if let Some(tags) = &draft.tags {
            fields.push(json!({ "name": "Tags", "value": tags.to_string() }));
        }
        json!({
            "title": "New post pending approval",
            "description": format!("```\n{}\n```", draft.body),
            "fields": fields,
            "footer": { "text": format!("id: {}", draft.draft_id) },
        })
    }

    async fn post_message(&self, channel_id: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::SurfaceDelivery(format!("Discord request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SurfaceDelivery(format!(
                "Discord API error {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::SurfaceDelivery(format!("Discord response unreadable: {}", e)))
    }

    async fn patch_message(
        &self,
        handle: &MessageHandle,
        payload: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, handle.channel_id, handle.message_id
        );
        let response = self
            .http
            .patch(&url)
            .header("Authorization", self.auth_header())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::SurfaceDelivery(format!("Discord request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SurfaceDelivery(format!(
                "Discord API error {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ReviewSurface for DiscordSurface {
    async fn render(&self, draft: &Draft) -> Result<MessageHandle> {
        let payload = json!({
            "embeds": [Self::render_embed(draft)],
            "components": Self::decision_components(&draft.draft_id.to_string()),
        });

        let message = self.post_message(&self.approval_channel_id, &payload).await?;
        let message_id = message
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::SurfaceDelivery("Discord response missing message id".into()))?
            .to_string();

        debug!("Rendered draft {} as message {}", draft.draft_id, message_id);

        Ok(MessageHandle {
            channel_id: self.approval_channel_id.clone(),
            message_id,
        })
    }

    async fn disable(&self, handle: &MessageHandle) -> Result<()> {
        // Removing the action rows deactivates the controls while keeping
        // the message (and its content) in the channel history.
        self.patch_message(handle, &json!({ "components": [] })).await
    }

    async fn update(&self, handle: &MessageHandle, summary: &str) -> Result<()> {
        // Discord PATCH only touches the provided fields, so writing the
        // summary into `content` leaves the draft embed intact.
        self.patch_message(handle, &json!({ "content": summary })).await
    }

    async fn notify(&self, text: &str) -> Result<()> {
        let Some(channel_id) = &self.notification_channel_id else {
            debug!("No notification channel configured, dropping: {}", text);
            return Ok(());
        };
        self.post_message(channel_id, &json!({ "content": text })).await?;
        Ok(())
    }
}

/// Parse a decision button custom id back into (decision, draft id)
pub fn parse_custom_id(custom_id: &str) -> Option<(postgate_common::db::models::Decision, uuid::Uuid)> {
    let (action, id) = custom_id.split_once(':')?;
    let decision = postgate_common::db::models::Decision::parse(action)?;
    let draft_id = uuid::Uuid::parse_str(id).ok()?;
    Some((decision, draft_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use postgate_common::db::models::Decision;
    use uuid::Uuid;

    #[test]
    fn test_custom_id_round_trip() {
        let draft_id = Uuid::new_v4();
        let custom_id = format!("approve:{}", draft_id);
        assert_eq!(parse_custom_id(&custom_id), Some((Decision::Approve, draft_id)));

        let custom_id = format!("edit:{}", draft_id);
        assert_eq!(parse_custom_id(&custom_id), Some((Decision::Edit, draft_id)));
    }

    #[test]
    fn test_custom_id_rejects_garbage() {
        assert_eq!(parse_custom_id("approve"), None);
        assert_eq!(parse_custom_id("approve:not-a-uuid"), None);
        assert_eq!(parse_custom_id(&format!("shrug:{}", Uuid::new_v4())), None);
    }

    fn draft_with_body(body: String) -> Draft {
        Draft {
            draft_id: Uuid::new_v4(),
            body,
            media_ref: None,
            tags: None,
            source: None,
            status: postgate_common::db::models::DraftStatus::Pending,
            created_at: chrono::Utc::now(),
            surfaced_at: None,
            decided_at: None,
            decided_by: None,
            decision_rationale: None,
            expired_at: None,
            published_at: None,
            external_id: None,
            external_url: None,
            message_ref: None,
            retry_count: 0,
            retry_eligible: true,
            last_error: None,
        }
    }

    #[test]
    fn test_render_embed_keeps_full_body() {
        let body = "a".repeat(2500);
        let draft = draft_with_body(body.clone());

        let embed = DiscordSurface::render_embed(&draft);
        let description = embed["description"].as_str().unwrap();
        assert!(description.contains(&body), "body must not be truncated");
    }

    #[test]
    fn test_maximum_length_draft_fits_embed_limit() {
        // Bodies up to the submission cap (3000 chars) must stay renderable:
        // the embed description caps at 4096, unlike message content at 2000
        let draft = draft_with_body("a".repeat(3000));

        let embed = DiscordSurface::render_embed(&draft);
        let description = embed["description"].as_str().unwrap();
        assert!(description.len() <= 4096);
        assert!(description.contains(&draft.body));
    }
}
