use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod settings;

pub use settings::{RunRequest, RunSettings};

/// Environment variable names that override values from the config file.
pub mod env_keys {
    pub const ZOOM_CLIENT_ID: &str = "ZOOM_CLIENT_ID";
    pub const ZOOM_CLIENT_SECRET: &str = "ZOOM_CLIENT_SECRET";
    pub const ZOOM_ACCOUNT_ID: &str = "ZOOM_ACCOUNT_ID";
    pub const RCLONE_REMOTE_NAME: &str = "RCLONE_REMOTE_NAME";
    pub const RCLONE_BASE_PATH: &str = "RCLONE_BASE_PATH";
    pub const SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub zoom: ZoomConfig,
    pub rclone: RcloneConfig,
    pub slack: SlackConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub account_id: Option<String>,
    pub api_base_url: String,
    pub oauth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RcloneConfig {
    /// Name of the configured rclone remote, without the trailing colon.
    pub remote: String,
    /// Folder on the remote that receives one sub-folder per recording date.
    pub base_path: String,
    /// Explicit rclone binary; looked up on PATH when unset.
    pub executable: Option<PathBuf>,
    /// Upper bound for one `rclone copy` of a date folder.
    pub copy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    pub enabled: bool,
    /// Deep-link template; `{id}` is replaced by the remote file id.
    pub link_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub download_dir: Option<PathBuf>,
    pub timezone: String,
    pub lookback_days: u32,
    pub min_duration_minutes: u32,
    pub token_refresh_margin_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append JSON events to a dated file under the data directory.
    pub event_log: bool,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            account_id: None,
            api_base_url: "https://api.zoom.us/v2".to_string(),
            oauth_url: "https://zoom.us/oauth/token".to_string(),
        }
    }
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            remote: "recordingdrive".to_string(),
            base_path: "Recordings".to_string(),
            executable: None,
            copy_timeout_secs: 2 * 60 * 60,
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            enabled: true,
            link_template: "https://drive.google.com/file/d/{id}/view".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            timezone: "Australia/Melbourne".to_string(),
            lookback_days: 7,
            min_duration_minutes: 5,
            token_refresh_margin_secs: 300,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { event_log: true }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config.with_env_overrides(|key| std::env::var(key).ok()));
        }

        let config = Self::load_from(&config_path)?;
        info!("Loaded config from {:?}", config_path);
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }

    /// Apply key-value overrides (normally the process environment).
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a configured secret.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(env_keys::ZOOM_CLIENT_ID) {
            self.zoom.client_id = Some(value);
        }
        if let Some(value) = get(env_keys::ZOOM_CLIENT_SECRET) {
            self.zoom.client_secret = Some(value);
        }
        if let Some(value) = get(env_keys::ZOOM_ACCOUNT_ID) {
            self.zoom.account_id = Some(value);
        }
        if let Some(value) = get(env_keys::RCLONE_REMOTE_NAME) {
            self.rclone.remote = value;
        }
        if let Some(value) = get(env_keys::RCLONE_BASE_PATH) {
            self.rclone.base_path = value;
        }
        if let Some(value) = get(env_keys::SLACK_WEBHOOK_URL) {
            self.slack.webhook_url = Some(value);
        }
        self
    }

    /// Copy of the config that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.zoom.client_secret = copy.zoom.client_secret.as_ref().map(|_| "********".into());
        copy.slack.webhook_url = copy.slack.webhook_url.as_deref().map(redact_url);
        copy
    }
}

fn redact_url(url: &str) -> String {
    let keep: String = url.chars().take(30).collect();
    format!("{keep}…")
}
