//! Slack incoming-webhook sink.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{Notification, NotificationSink};
use crate::error::NotifyError;

pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for SlackWebhook {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&build_payload(notification))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            file = %notification.file_name,
            "Slack notification sent"
        );
        Ok(())
    }
}

/// Block Kit message announcing one uploaded file.
pub fn build_payload(notification: &Notification) -> Value {
    let location = match &notification.link {
        Some(link) => format!("<{link}|View in Google Drive>"),
        None => format!("`{}` (link unavailable)", notification.file_name),
    };

    json!({
        "text": format!("New recording uploaded: {}", notification.topic),
        "blocks": [
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*New recording uploaded*\n• Recording: {}\n• File: {}\n• {}",
                        notification.topic, notification.file_name, location
                    )
                }
            },
            {
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": "_Uploaded by zoom-drive-sync_" }
                ]
            }
        ]
    })
}
