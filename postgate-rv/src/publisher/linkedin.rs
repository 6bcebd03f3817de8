//! LinkedIn publisher
//!
//! Publishes approved drafts as UGC posts on behalf of the configured
//! member. Failure responses are classified by HTTP status: rate limits
//! and server-side errors are transient (retry-eligible), any other 4xx
//! is a permanent rejection of the content or credentials.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{PublishApi, PublishFailure, PublishedPost};

const LINKEDIN_API_BASE: &str = "https://api.linkedin.com/v2";

/// LinkedIn REST implementation of `PublishApi`
pub struct LinkedInPublisher {
    http: Client,
    access_token: String,
    person_id: String,
    base_url: String,
}

impl LinkedInPublisher {
    pub fn new(http: Client, access_token: String, person_id: String) -> Self {
        Self {
            http,
            access_token,
            person_id,
            base_url: LINKEDIN_API_BASE.to_string(),
        }
    }

    fn ugc_payload(&self, body: &str, media_ref: Option<&str>) -> Value {
        let mut share_content = json!({
            "shareCommentary": { "text": body },
            "shareMediaCategory": "NONE",
        });
        if let Some(media) = media_ref {
            share_content["shareMediaCategory"] = json!("ARTICLE");
            share_content["media"] = json!([{
                "status": "READY",
                "originalUrl": media,
            }]);
        }
        json!({
            "author": format!("urn:li:person:{}", self.person_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": share_content,
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC",
            },
        })
    }

    fn classify_status(status: StatusCode, body: &str) -> PublishFailure {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            PublishFailure::transient(format!("LinkedIn API error {}: {}", status, body))
        } else {
            PublishFailure::permanent(format!("LinkedIn API error {}: {}", status, body))
        }
    }

    /// Canonical feed URL for a published share. The urn carries a numeric
    /// activity id as its last colon-separated segment.
    fn post_url(external_id: &str) -> Option<String> {
        let activity_id = external_id.rsplit(':').next()?;
        if activity_id.is_empty() || !activity_id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(format!(
            "https://www.linkedin.com/feed/update/urn:li:activity:{}",
            activity_id
        ))
    }
}

#[async_trait]
impl PublishApi for LinkedInPublisher {
    async fn publish(
        &self,
        body: &str,
        media_ref: Option<&str>,
    ) -> std::result::Result<PublishedPost, PublishFailure> {
        let url = format!("{}/ugcPosts", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&self.ugc_payload(body, media_ref))
            .send()
            .await
            .map_err(|e| {
                // Connection failures and client-side timeouts never reached
                // the API, so a retry is safe.
                PublishFailure::transient(format!("LinkedIn request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &text));
        }

        // The post id arrives in the X-RestLi-Id header, with the response
        // body's "id" field as fallback.
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let external_id = match header_id {
            Some(id) => id,
            None => {
                let parsed: Value = response.json().await.map_err(|e| {
                    PublishFailure::permanent(format!("LinkedIn response unreadable: {}", e))
                })?;
                parsed
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PublishFailure::permanent("LinkedIn response missing post id".to_string())
                    })?
            }
        };

        debug!("Published to LinkedIn as {}", external_id);

        let url = Self::post_url(&external_id);
        Ok(PublishedPost { external_id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let failure = LinkedInPublisher::classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(failure.is_retry_eligible());
    }

    #[test]
    fn test_server_error_is_transient() {
        let failure = LinkedInPublisher::classify_status(StatusCode::BAD_GATEWAY, "upstream");
        assert!(failure.is_retry_eligible());
    }

    #[test]
    fn test_validation_rejection_is_permanent() {
        let failure =
            LinkedInPublisher::classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad content");
        assert!(!failure.is_retry_eligible());
    }

    #[test]
    fn test_auth_failure_is_permanent() {
        let failure = LinkedInPublisher::classify_status(StatusCode::UNAUTHORIZED, "expired token");
        assert!(!failure.is_retry_eligible());
    }

    #[test]
    fn test_post_url_from_share_urn() {
        assert_eq!(
            LinkedInPublisher::post_url("urn:li:share:7123456789").as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:activity:7123456789")
        );
        assert_eq!(LinkedInPublisher::post_url("urn:li:share:"), None);
        assert_eq!(LinkedInPublisher::post_url("opaque-id"), None);
    }

    #[test]
    fn test_payload_with_media_uses_article_category() {
        let publisher = LinkedInPublisher::new(
            Client::new(),
            "token".to_string(),
            "abc123".to_string(),
        );
        let payload = publisher.ugc_payload("hello", Some("https://example.com/x.png"));
        let content = &payload["specificContent"]["com.linkedin.ugc.ShareContent"];
        assert_eq!(content["shareMediaCategory"], "ARTICLE");
        assert_eq!(payload["author"], "urn:li:person:abc123");
    }
}
