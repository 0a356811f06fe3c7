//! Moving a staged date folder to the remote and resolving remote ids.

pub mod rclone;

pub use rclone::{RcloneTransfer, REMOTE_ID_KEYS};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::TransferError;
use crate::retry::{with_retry, RetryPolicy};

/// External utility that copies a local directory to the remote.
#[async_trait]
pub trait TransferTool: Send + Sync {
    /// Human-readable remote location for a date folder.
    fn destination(&self, date_folder: &str) -> String;

    /// Tool present, remote configured and reachable.
    async fn check_environment(&self) -> Result<(), TransferError>;

    async fn copy_directory(&self, local: &Path, date_folder: &str) -> Result<(), TransferError>;

    /// File name to remote id for everything in the remote date folder.
    async fn list_remote_ids(
        &self,
        date_folder: &str,
    ) -> Result<HashMap<String, Option<String>>, TransferError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferResult {
    pub date_folder: String,
    /// Remote id per transferred file name. Files without a resolvable id
    /// are absent.
    pub remote_ids: HashMap<String, String>,
}

impl TransferResult {
    pub fn remote_id(&self, file_name: &str) -> Option<&str> {
        self.remote_ids.get(file_name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred(TransferResult),
    /// No staged files, so the tool was never invoked.
    NothingToTransfer,
}

pub struct TransferOrchestrator {
    tool: Arc<dyn TransferTool>,
    retry: RetryPolicy,
}

impl TransferOrchestrator {
    pub fn new(tool: Arc<dyn TransferTool>, retry: RetryPolicy) -> Self {
        Self { tool, retry }
    }

    pub fn destination(&self, date_folder: &str) -> String {
        self.tool.destination(date_folder)
    }

    pub async fn check_environment(&self) -> Result<(), TransferError> {
        let tool = &self.tool;
        with_retry(&self.retry, "rclone environment check", || async move {
            tool.check_environment().await
        })
        .await
    }

    /// Copy `local` to the remote date folder and look up ids for
    /// `file_names`. Only the copy itself can fail the transfer; a failed id
    /// listing just leaves the ids empty.
    pub async fn transfer(
        &self,
        local: &Path,
        date_folder: &str,
        file_names: &[String],
    ) -> Result<TransferOutcome, TransferError> {
        if file_names.is_empty() || count_staged_files(local) == 0 {
            info!(
                date_folder,
                "Nothing staged in {}, skipping transfer",
                local.display()
            );
            return Ok(TransferOutcome::NothingToTransfer);
        }

        let destination = self.tool.destination(date_folder);
        info!(
            date_folder,
            "Transferring {} files to {}",
            file_names.len(),
            destination
        );

        let tool = &self.tool;
        with_retry(&self.retry, "rclone copy", || async move {
            tool.copy_directory(local, date_folder).await
        })
        .await?;

        let listing = with_retry(&self.retry, "rclone lsjson", || async move {
            tool.list_remote_ids(date_folder).await
        })
        .await;

        let mut result = TransferResult {
            date_folder: date_folder.to_string(),
            remote_ids: HashMap::new(),
        };
        match listing {
            Ok(listing) => {
                for name in file_names {
                    match listing.get(name).cloned().flatten() {
                        Some(id) => {
                            result.remote_ids.insert(name.clone(), id);
                        }
                        None => warn!(
                            date_folder,
                            file = %name,
                            "No remote id found, link unavailable"
                        ),
                    }
                }
            }
            Err(err) => warn!(
                date_folder,
                "Could not list remote ids, links unavailable: {}", err
            ),
        }

        Ok(TransferOutcome::Transferred(result))
    }
}

/// Regular files in `dir`, ignoring leftover partial downloads.
pub fn count_staged_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext != "part")
                .unwrap_or(true)
        })
        .count()
}
