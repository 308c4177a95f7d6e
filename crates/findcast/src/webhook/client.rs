//! Webhook delivery client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::WebhookIdentity;
use crate::error::{RelayError, Result};

/// A rendered notification ready for posting.
#[derive(Debug, Clone)]
pub struct RenderedNotification {
    /// Attention caption above the embed, present only for exceptional finds.
    pub content: Option<String>,
    /// Discord embed object.
    pub embed: Value,
}

/// Posts rendered notifications to destination webhooks.
///
/// Delivery failures are reported, not retried; retry policy belongs to the
/// chat platform client, not this pipeline.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn deliver(&self, url: &str, notification: &RenderedNotification) -> Result<()>;
}

/// Discord webhook sender backed by reqwest.
pub struct DiscordWebhookClient {
    client: Client,
    identity: WebhookIdentity,
}

impl DiscordWebhookClient {
    pub fn new(identity: WebhookIdentity) -> Self {
        Self {
            client: Client::new(),
            identity,
        }
    }

    fn build_payload(&self, notification: &RenderedNotification) -> Value {
        let mut payload = json!({
            "username": self.identity.username,
            "embeds": [notification.embed],
        });
        if let Some(content) = &notification.content {
            payload["content"] = json!(content);
        }
        if let Some(avatar_url) = &self.identity.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }
        payload
    }
}

#[async_trait]
impl WebhookSender for DiscordWebhookClient {
    async fn deliver(&self, url: &str, notification: &RenderedNotification) -> Result<()> {
        let payload = self.build_payload(notification);

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::delivery(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            debug!("webhook delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(%status, "webhook post rejected");
        Err(RelayError::delivery(format!("{status} - {body}")))
    }
}
