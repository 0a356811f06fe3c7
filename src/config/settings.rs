//! Run settings assembled once per invocation.
//!
//! The config file, environment overrides and CLI flags are merged here into
//! a single immutable [`RunSettings`] value that every pipeline component
//! receives at construction time.

use anyhow::{anyhow, bail, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

use super::{Config, RcloneConfig, ZoomConfig};
use crate::global;
use crate::retry::RetryPolicy;

/// Longest lookback a run accepts, about ten years.
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// Per-invocation request, usually built from CLI flags. `None` fields fall
/// back to the config file.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub meeting_name: String,
    pub email: String,
    pub lookback_days: Option<u32>,
    pub dry_run: bool,
    pub disable_notifications: bool,
    pub slack_webhook: Option<String>,
    pub rclone_remote: Option<String>,
    pub rclone_base_path: Option<String>,
    pub timezone: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// `None` means notifications are disabled for this run.
    pub webhook_url: Option<String>,
    pub link_template: String,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub meeting_name: String,
    pub email: String,
    pub lookback_days: u32,
    pub dry_run: bool,
    pub show_progress: bool,
    pub timezone: Tz,
    pub download_root: PathBuf,
    pub min_duration_minutes: u32,
    pub token_refresh_margin: Duration,
    pub zoom: ZoomConfig,
    pub rclone: RcloneConfig,
    pub notifications: NotificationSettings,
    pub retry: RetryPolicy,
}

impl RunSettings {
    pub fn assemble(config: &Config, request: RunRequest) -> Result<Self> {
        let meeting_name = request.meeting_name.trim().to_string();
        if meeting_name.is_empty() {
            bail!("A meeting name to search for is required");
        }
        let email = request.email.trim().to_string();
        if email.is_empty() {
            bail!("The Zoom user email is required");
        }

        let lookback_days = request
            .lookback_days
            .unwrap_or(config.pipeline.lookback_days);
        if lookback_days > MAX_LOOKBACK_DAYS {
            bail!(
                "Lookback of {} days is too long (at most {} days)",
                lookback_days,
                MAX_LOOKBACK_DAYS
            );
        }

        let tz_name = request
            .timezone
            .unwrap_or_else(|| config.pipeline.timezone.clone());
        let timezone = parse_timezone(&tz_name)?;

        let download_root = match request.download_dir.or_else(|| config.pipeline.download_dir.clone())
        {
            Some(dir) => dir,
            None => global::downloads_dir()?,
        };

        let mut rclone = config.rclone.clone();
        if let Some(remote) = request.rclone_remote {
            rclone.remote = remote;
        }
        if let Some(base_path) = request.rclone_base_path {
            rclone.base_path = base_path;
        }
        rclone.remote = rclone.remote.trim_end_matches(':').to_string();
        rclone.base_path = rclone.base_path.trim_matches('/').to_string();

        let webhook_url = if request.disable_notifications || !config.slack.enabled {
            None
        } else {
            request
                .slack_webhook
                .or_else(|| config.slack.webhook_url.clone())
                .filter(|url| !url.trim().is_empty())
        };

        Ok(Self {
            meeting_name,
            email,
            lookback_days,
            dry_run: request.dry_run,
            show_progress: request.show_progress,
            timezone,
            download_root,
            min_duration_minutes: config.pipeline.min_duration_minutes,
            token_refresh_margin: Duration::from_secs(config.pipeline.token_refresh_margin_secs),
            zoom: config.zoom.clone(),
            rclone,
            notifications: NotificationSettings {
                webhook_url,
                link_template: config.slack.link_template.clone(),
            },
            retry: RetryPolicy::from(&config.retry),
        })
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|err| anyhow!("Unknown timezone '{}': {}", name, err))
}
