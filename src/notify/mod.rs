//! Announcing uploaded meeting videos.

pub mod slack;

pub use slack::SlackWebhook;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::PRIMARY_VIDEO_EXTENSION;
use crate::error::NotifyError;
use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub file_name: String,
    /// Deep link to the uploaded file, when its remote id is known.
    pub link: Option<String>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPrimaryVideo,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Skipped(SkipReason),
}

pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    link_template: String,
    retry: RetryPolicy,
}

impl Notifier {
    pub fn new(
        sink: Option<Arc<dyn NotificationSink>>,
        link_template: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sink,
            link_template: link_template.into(),
            retry,
        }
    }

    pub fn link_for(&self, remote_id: &str) -> String {
        self.link_template.replace("{id}", remote_id)
    }

    pub async fn notify(
        &self,
        topic: &str,
        file_name: &str,
        remote_id: Option<&str>,
    ) -> Result<NotifyOutcome, NotifyError> {
        if !is_primary_video(file_name) {
            return Ok(NotifyOutcome::Skipped(SkipReason::NotPrimaryVideo));
        }
        let Some(sink) = &self.sink else {
            debug!(file = %file_name, "Notifications disabled, skipping");
            return Ok(NotifyOutcome::Skipped(SkipReason::Disabled));
        };

        let notification = Notification {
            topic: topic.to_string(),
            file_name: file_name.to_string(),
            link: remote_id.map(|id| self.link_for(id)),
        };
        let notification = &notification;
        with_retry(&self.retry, "slack notification", || async move {
            sink.send(notification).await
        })
        .await?;

        Ok(NotifyOutcome::Sent)
    }
}

fn is_primary_video(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(PRIMARY_VIDEO_EXTENSION))
        .unwrap_or(false)
}
