//! Staging recording files into `<root>/<date_folder>/`.

pub mod fetcher;

pub use fetcher::{partial_path, DryRunFetcher, Fetched, Fetcher, HttpFetcher};

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::catalog::{FileMeta, RecordingMeta};
use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    SkippedDryRun { path: PathBuf },
    SkippedUnknownType,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub file: FileMeta,
    /// `None` for unknown file types.
    pub file_name: Option<String>,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn is_downloaded(&self) -> bool {
        matches!(self.outcome, FileOutcome::Downloaded { .. })
    }
}

pub struct DownloadOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
    show_progress: bool,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, retry: RetryPolicy, show_progress: bool) -> Self {
        Self {
            fetcher,
            retry,
            show_progress,
        }
    }

    /// Download every file of `recording`. Never fails as a whole: each file
    /// carries its own outcome.
    pub async fn download(
        &self,
        recording: &RecordingMeta,
        destination_root: &Path,
    ) -> Vec<FileReport> {
        let date_folder = recording.date_folder();
        let staging = staging_dir(destination_root, &date_folder);
        let prepared = self.fetcher.prepare(&staging).await;

        let mut reports = Vec::with_capacity(recording.files.len());
        for file in &recording.files {
            let Some(file_name) = recording.file_name(file) else {
                warn!(
                    topic = %recording.topic,
                    date_folder = %date_folder,
                    "Skipping unknown recording file type '{}'",
                    file.file_type
                );
                reports.push(FileReport {
                    file: file.clone(),
                    file_name: None,
                    outcome: FileOutcome::SkippedUnknownType,
                });
                continue;
            };

            let outcome = match &prepared {
                Err(err) => FileOutcome::Failed {
                    reason: err.to_string(),
                },
                Ok(()) => self.fetch_one(file, &staging.join(&file_name)).await,
            };

            match &outcome {
                FileOutcome::Downloaded { bytes, .. } => info!(
                    topic = %recording.topic,
                    file = %file_name,
                    "Downloaded {} bytes",
                    bytes
                ),
                FileOutcome::SkippedDryRun { path } => info!(
                    topic = %recording.topic,
                    file = %file_name,
                    "[dry-run] Would download to {}",
                    path.display()
                ),
                FileOutcome::Failed { reason } => error!(
                    topic = %recording.topic,
                    file = %file_name,
                    "Download failed: {}",
                    reason
                ),
                FileOutcome::SkippedUnknownType => {}
            }

            reports.push(FileReport {
                file: file.clone(),
                file_name: Some(file_name),
                outcome,
            });
        }

        reports
    }

    async fn fetch_one(&self, file: &FileMeta, dest: &Path) -> FileOutcome {
        let bar = self.progress_bar(dest);
        let progress = &bar;
        let fetcher = &self.fetcher;
        let result = with_retry(&self.retry, "download", || async move {
            fetcher
                .fetch(&file.download_url, dest, file.file_size, progress)
                .await
        })
        .await;
        bar.finish_and_clear();

        match result {
            Ok(Fetched::Written { bytes }) | Ok(Fetched::AlreadyPresent { bytes }) => {
                FileOutcome::Downloaded {
                    path: dest.to_path_buf(),
                    bytes,
                }
            }
            Ok(Fetched::DryRun) => FileOutcome::SkippedDryRun {
                path: dest.to_path_buf(),
            },
            Err(err) => FileOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }

    fn progress_bar(&self, dest: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        create_progress_bar(
            dest.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    }
}

/// `<root>/<date_folder>`
pub fn staging_dir(root: &Path, date_folder: &str) -> PathBuf {
    root.join(date_folder)
}

fn create_progress_bar(message: String) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
    {
        pb.set_style(style.progress_chars("━╸━"));
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
