//! rclone driven as a child process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::TransferTool;
use crate::config::RcloneConfig;
use crate::error::TransferError;

/// Keys rclone backends use for the remote file id, in lookup order.
pub const REMOTE_ID_KEYS: [&str; 5] = ["ID", "Id", "id", "FileId", "fileId"];

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(30);
const LISTING_TIMEOUT: Duration = Duration::from_secs(120);

/// Interrupted downloads left in a staging folder must never reach the remote.
const PARTIAL_DOWNLOAD_GLOB: &str = "*.part";

pub struct RcloneTransfer {
    executable: PathBuf,
    remote: String,
    base_path: String,
    copy_timeout: Duration,
}

impl RcloneTransfer {
    pub fn new(config: &RcloneConfig) -> Self {
        Self {
            executable: config
                .executable
                .clone()
                .unwrap_or_else(|| PathBuf::from("rclone")),
            remote: config.remote.trim_end_matches(':').to_string(),
            base_path: config.base_path.trim_matches('/').to_string(),
            copy_timeout: Duration::from_secs(config.copy_timeout_secs.max(1)),
        }
    }

    fn resolve_executable(&self) -> Result<PathBuf, TransferError> {
        which::which(&self.executable)
            .map_err(|_| TransferError::ToolMissing(self.executable.display().to_string()))
    }

    /// Run rclone and return its stdout.
    async fn run(&self, args: &[&str], limit: Duration) -> Result<String, TransferError> {
        let command = format!("rclone {}", args.join(" "));
        debug!("Running {}", command);

        let child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    TransferError::ToolMissing(self.executable.display().to_string())
                }
                _ => TransferError::Spawn(err),
            })?;

        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => Err(TransferError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Ok(Err(err)) => Err(TransferError::Spawn(err)),
            Err(_) => Err(TransferError::Timeout {
                command,
                secs: limit.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl TransferTool for RcloneTransfer {
    fn destination(&self, date_folder: &str) -> String {
        if self.base_path.is_empty() {
            format!("{}:{}", self.remote, date_folder)
        } else {
            format!("{}:{}/{}", self.remote, self.base_path, date_folder)
        }
    }

    async fn check_environment(&self) -> Result<(), TransferError> {
        let executable = self.resolve_executable()?;
        debug!("Using rclone at {}", executable.display());

        let listing = self.run(&["listremotes"], REACHABILITY_TIMEOUT).await?;
        let available = parse_listremotes(&listing);
        if !available.iter().any(|name| name == &self.remote) {
            return Err(TransferError::RemoteNotConfigured {
                remote: self.remote.clone(),
                available,
            });
        }

        let root = format!("{}:", self.remote);
        self.run(&["lsd", &root], REACHABILITY_TIMEOUT)
            .await
            .map_err(|err| TransferError::Unreachable {
                remote: self.remote.clone(),
                detail: err.to_string(),
            })?;

        info!("rclone remote '{}' is configured and reachable", self.remote);
        Ok(())
    }

    async fn copy_directory(&self, local: &Path, date_folder: &str) -> Result<(), TransferError> {
        let destination = self.destination(date_folder);
        let source = local.to_string_lossy();

        self.run(&["mkdir", &destination], LISTING_TIMEOUT).await?;
        self.run(
            &[
                "copy",
                &*source,
                &destination,
                "--checksum",
                "--exclude",
                PARTIAL_DOWNLOAD_GLOB,
            ],
            self.copy_timeout,
        )
        .await?;
        Ok(())
    }

    async fn list_remote_ids(
        &self,
        date_folder: &str,
    ) -> Result<HashMap<String, Option<String>>, TransferError> {
        let destination = self.destination(date_folder);
        let listing = self.run(&["lsjson", &destination], LISTING_TIMEOUT).await?;
        parse_lsjson(&listing)
    }
}

/// `rclone listremotes` prints one `name:` per line.
pub fn parse_listremotes(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_end_matches(':').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// File name to remote id for every file entry of an `rclone lsjson` listing.
pub fn parse_lsjson(stdout: &str) -> Result<HashMap<String, Option<String>>, TransferError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(stdout.trim())
        .map_err(|err| TransferError::MalformedListing(err.to_string()))?;

    let mut ids = HashMap::new();
    for entry in &entries {
        if entry.get("IsDir").and_then(|v| v.as_bool()).unwrap_or(false) {
            continue;
        }
        let Some(name) = entry.get("Name").and_then(|v| v.as_str()) else {
            continue;
        };
        let id = REMOTE_ID_KEYS.iter().find_map(|key| {
            entry
                .get(*key)
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        });
        ids.insert(name.to_string(), id);
    }
    Ok(ids)
}
