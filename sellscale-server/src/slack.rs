//! Slack notifications.
//!
//! Notifications are rendered to Block Kit payloads and posted to every
//! incoming-webhook URL configured for their channel. A channel with no URLs
//! is disabled and sends are silently skipped.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use sellscale_core::{Notification, NotifyChannel};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Slack webhook {url} returned {status}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to reach Slack webhook {url}: {message}")]
    Transport { url: String, message: String },
}

/// A rendered Slack message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    /// Fallback text for notifications and clients without block support.
    pub text: String,
    pub blocks: Vec<Value>,
}

/// Sends rendered messages to a channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: NotifyChannel, message: &SlackMessage)
        -> Result<(), NotifyError>;
}

/// Link to the prospect in the web app.
pub fn prospect_url(app_base_url: &str, prospect_id: sellscale_core::ProspectId) -> String {
    format!(
        "{}/prospects/{}",
        app_base_url.trim_end_matches('/'),
        prospect_id
    )
}

/// Render a notification to Block Kit.
pub fn render_notification(notification: &Notification, app_base_url: &str) -> SlackMessage {
    let prospect = notification.prospect();
    let headline = notification.headline();
    let url = prospect_url(app_base_url, prospect.prospect_id);

    let mut blocks = vec![
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*{}*", headline) }
        }),
        json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!("Prospect #{} · SDR #{}", prospect.prospect_id, prospect.client_sdr_id)
            }]
        }),
    ];

    match notification {
        Notification::DemoSetHandoff { .. } | Notification::DemoWon { .. } => {
            blocks.push(json!({
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Open in SellScale" },
                    "url": url
                }]
            }));
        }
        Notification::DemoSetDetected { .. } => {
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("<{}|Review the conversation> and confirm the demo.", url)
                }
            }));
            let value = prospect.prospect_id.to_string();
            blocks.push(json!({
                "type": "actions",
                "elements": [
                    {
                        "type": "button",
                        "style": "primary",
                        "text": { "type": "plain_text", "text": "Confirm demo" },
                        "action_id": "demo_detection_confirm",
                        "value": value
                    },
                    {
                        "type": "button",
                        "style": "danger",
                        "text": { "type": "plain_text", "text": "Not a demo" },
                        "action_id": "demo_detection_reject",
                        "value": value
                    }
                ]
            }));
        }
        Notification::InviteAccepted { .. } | Notification::ConversationStarted { .. } => {
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("<{}|View prospect>", url) }
            }));
        }
    }

    SlackMessage {
        text: headline,
        blocks,
    }
}

/// Posts to Slack incoming webhooks.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhooks: HashMap<NotifyChannel, Vec<String>>,
}

impl SlackNotifier {
    pub fn new(webhooks: HashMap<NotifyChannel, Vec<String>>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, webhooks }
    }

    async fn post(&self, url: &str, message: &SlackMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(
        &self,
        channel: NotifyChannel,
        message: &SlackMessage,
    ) -> Result<(), NotifyError> {
        let urls = self
            .webhooks
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if urls.is_empty() {
            debug!("Slack channel {} disabled, skipping", channel.as_str());
            return Ok(());
        }

        // Every webhook is attempted; the first failure is reported.
        let mut first_error = None;
        for url in urls {
            if let Err(e) = self.post(url, message).await {
                warn!("Slack post to {} channel failed: {}", channel.as_str(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
