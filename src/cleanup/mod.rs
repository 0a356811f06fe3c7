//! Removing staging folders once their contents are safely on the remote.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::error::CleanupError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    /// Kept on purpose because the transfer did not succeed.
    Retained,
    /// Removal was attempted and failed; the folder is still on disk.
    RemovalFailed { reason: String },
}

#[derive(Debug, Default)]
pub struct CleanupManager;

impl CleanupManager {
    pub fn new() -> Self {
        Self
    }

    /// Remove `staging` only when its transfer succeeded. Anything else,
    /// including a failed removal, keeps the folder for manual recovery.
    pub async fn cleanup(&self, staging: &Path, transfer_succeeded: bool) -> CleanupOutcome {
        if !transfer_succeeded {
            warn!(
                "Keeping {} because its transfer did not succeed",
                staging.display()
            );
            return CleanupOutcome::Retained;
        }

        match remove_staging(staging).await {
            Ok(()) => {
                info!("Removed staging folder {}", staging.display());
                CleanupOutcome::Removed
            }
            Err(err) => {
                warn!("{}", err);
                CleanupOutcome::RemovalFailed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

async fn remove_staging(staging: &Path) -> Result<(), CleanupError> {
    match tokio::fs::remove_dir_all(staging).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanupError {
            path: staging.to_path_buf(),
            source,
        }),
    }
}
