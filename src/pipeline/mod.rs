//! Sequencing a run from credentials to cleanup.
//!
//! Auth, user resolution, listing and (for live runs) the environment check
//! are preconditions: a failure there aborts the run. After that every date
//! folder is processed independently and problems only add lines to the
//! [`RunReport`].

pub mod lock;
pub mod report;

pub use lock::RunLock;
pub use report::{Failure, RunReport, RunStatus, Stage};

use std::path::Path;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{TokenManager, TokenSource};
use crate::catalog::{date_window, RecordingCatalog, RecordingMeta, RecordingSource};
use crate::cleanup::{CleanupManager, CleanupOutcome};
use crate::config::RunSettings;
use crate::download::{
    staging_dir, DownloadOrchestrator, DryRunFetcher, FileOutcome, Fetcher, HttpFetcher,
};
use crate::error::FatalError;
use crate::notify::{NotificationSink, Notifier, NotifyOutcome, SkipReason, SlackWebhook};
use crate::retry::with_retry;
use crate::transfer::{RcloneTransfer, TransferOrchestrator, TransferOutcome, TransferTool};
use crate::zoom::ZoomClient;

/// External collaborators a pipeline is built from.
pub struct Components {
    pub tokens: Arc<dyn TokenSource>,
    pub source: Arc<dyn RecordingSource>,
    /// Used for live runs only; dry runs always use [`DryRunFetcher`].
    pub fetcher: Arc<dyn Fetcher>,
    pub transfer_tool: Arc<dyn TransferTool>,
    pub notification_sink: Option<Arc<dyn NotificationSink>>,
}

impl Components {
    /// Zoom, HTTP downloads, rclone and Slack, as configured.
    pub fn from_settings(settings: &RunSettings) -> Self {
        let tokens: Arc<dyn TokenSource> = Arc::new(TokenManager::new(
            &settings.zoom,
            settings.token_refresh_margin,
        ));
        let source = Arc::new(ZoomClient::new(&settings.zoom, tokens.clone()));
        let fetcher = Arc::new(HttpFetcher::new(tokens.clone()));
        let notification_sink = settings
            .notifications
            .webhook_url
            .as_ref()
            .map(|url| Arc::new(SlackWebhook::new(url.clone())) as Arc<dyn NotificationSink>);

        Self {
            tokens,
            source,
            fetcher,
            transfer_tool: Arc::new(RcloneTransfer::new(&settings.rclone)),
            notification_sink,
        }
    }
}

pub struct Pipeline {
    settings: RunSettings,
    tokens: Arc<dyn TokenSource>,
    catalog: RecordingCatalog,
    downloads: DownloadOrchestrator,
    transfers: TransferOrchestrator,
    notifier: Notifier,
    cleanup: CleanupManager,
}

/// Recordings sharing a local start date, in provider order.
struct FolderBatch<'a> {
    date_folder: String,
    recordings: Vec<&'a RecordingMeta>,
}

/// A file staged by this run, pending transfer and notification.
struct StagedFile {
    topic: String,
    file_name: String,
}

impl Pipeline {
    pub fn from_settings(settings: RunSettings) -> Self {
        let components = Components::from_settings(&settings);
        Self::new(settings, components)
    }

    pub fn new(settings: RunSettings, components: Components) -> Self {
        let fetcher: Arc<dyn Fetcher> = if settings.dry_run {
            Arc::new(DryRunFetcher)
        } else {
            components.fetcher
        };

        Self {
            catalog: RecordingCatalog::new(components.source, &settings),
            downloads: DownloadOrchestrator::new(
                fetcher,
                settings.retry,
                settings.show_progress && !settings.dry_run,
            ),
            transfers: TransferOrchestrator::new(components.transfer_tool, settings.retry),
            notifier: Notifier::new(
                components.notification_sink,
                settings.notifications.link_template.clone(),
                settings.retry,
            ),
            cleanup: CleanupManager::new(),
            tokens: components.tokens,
            settings,
        }
    }

    /// Run to completion. Always returns a report; check
    /// [`RunReport::is_aborted`] for precondition failures.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id, dry_run = self.settings.dry_run);
        let report = RunReport::new(run_id, self.settings.dry_run);
        self.execute(report).instrument(span).await
    }

    async fn execute(&self, mut report: RunReport) -> RunReport {
        let retry = &self.settings.retry;
        info!(
            "Looking for '{}' recordings of {} in the last {} days{}",
            self.settings.meeting_name,
            self.settings.email,
            self.settings.lookback_days,
            if self.settings.dry_run { " (dry run)" } else { "" }
        );

        let tokens = &self.tokens;
        if let Err(err) = with_retry(retry, "zoom token", || async move { tokens.get_token().await }).await {
            return abort(report, FatalError::from(err), Stage::Auth);
        }
        info!(stage = %Stage::Auth, "Authenticated with Zoom");

        let catalog = &self.catalog;
        let email = self.settings.email.as_str();
        let user = match with_retry(retry, "zoom user lookup", || async move {
            catalog.resolve_user(email).await
        })
        .await
        {
            Ok(user) => user,
            Err(err) => return abort(report, FatalError::from(err), Stage::UserResolution),
        };

        let today = self.catalog.today();
        let Some((from, to)) = date_window(today, self.settings.lookback_days) else {
            let reason = format!(
                "a lookback of {} days from {} is out of range",
                self.settings.lookback_days, today
            );
            return abort_at(report, Stage::Listing, reason);
        };
        report.window_from = Some(from);
        report.window_to = Some(to);

        let user = &user;
        let listing = match with_retry(retry, "zoom recordings listing", || async move {
            catalog.list_recordings(user, from, to).await
        })
        .await
        {
            Ok(listing) => listing,
            Err(err) => return abort(report, FatalError::from(err), Stage::Listing),
        };

        report.recordings_seen = listing.seen;
        report.recordings_matched = listing.matched.len();
        report.recordings_too_short = listing.too_short.len();
        report.files_planned = listing
            .matched
            .iter()
            .flat_map(|recording| &recording.files)
            .filter(|file| file.kind.is_some())
            .count();
        info!(
            stage = %Stage::Listing,
            "{} of {} recordings matched '{}' ({} too short)",
            report.recordings_matched,
            report.recordings_seen,
            self.settings.meeting_name,
            report.recordings_too_short
        );

        if listing.matched.is_empty() {
            return finish(report);
        }

        let _lock = if self.settings.dry_run {
            None
        } else {
            if let Err(err) = self.transfers.check_environment().await {
                return abort(report, FatalError::from(err), Stage::EnvironmentCheck);
            }
            match RunLock::acquire(&self.settings.download_root).await {
                Ok(lock) => Some(lock),
                Err(err) => {
                    return abort_at(
                        report,
                        Stage::Init,
                        format!("could not lock the staging folder: {err}"),
                    )
                }
            }
        };

        for batch in group_by_date_folder(&listing.matched) {
            self.process_folder(&batch, &mut report)
                .instrument(info_span!("folder", date_folder = %batch.date_folder))
                .await;
        }

        finish(report)
    }

    async fn process_folder(&self, batch: &FolderBatch<'_>, report: &mut RunReport) {
        let root = self.settings.download_root.as_path();
        let date_folder = batch.date_folder.as_str();
        let staging = staging_dir(root, date_folder);

        let staged = self.download_batch(batch, root, report).await;

        if self.settings.dry_run {
            info!(
                "[dry-run] Would transfer {} to {}",
                staging.display(),
                self.transfers.destination(date_folder)
            );
            return;
        }

        let file_names: Vec<String> = staged.iter().map(|f| f.file_name.clone()).collect();
        let result = match self.transfers.transfer(&staging, date_folder, &file_names).await {
            Ok(TransferOutcome::Transferred(result)) => {
                report.files_transferred += file_names.len();
                result
            }
            Ok(TransferOutcome::NothingToTransfer) => {
                if staging.exists() {
                    self.cleanup.cleanup(&staging, false).await;
                    report.folders_retained.push(staging);
                }
                return;
            }
            Err(err) => {
                warn!(stage = %Stage::Transfer, "Transfer failed: {}", err);
                report.record_failure(Stage::Transfer, None, Some(date_folder), None, err.to_string());
                self.cleanup.cleanup(&staging, false).await;
                report.folders_retained.push(staging);
                return;
            }
        };

        for file in &staged {
            let remote_id = result.remote_id(&file.file_name);
            match self.notifier.notify(&file.topic, &file.file_name, remote_id).await {
                Ok(NotifyOutcome::Sent) => report.notifications_sent += 1,
                Ok(NotifyOutcome::Skipped(SkipReason::Disabled)) => {
                    report.notifications_skipped += 1
                }
                Ok(NotifyOutcome::Skipped(SkipReason::NotPrimaryVideo)) => {}
                Err(err) => {
                    warn!(stage = %Stage::Notify, file = %file.file_name, "Notification failed: {}", err);
                    report.notifications_failed += 1;
                    report.record_failure(
                        Stage::Notify,
                        Some(&file.topic),
                        Some(date_folder),
                        Some(&file.file_name),
                        err.to_string(),
                    );
                }
            }
        }

        match self.cleanup.cleanup(&staging, true).await {
            CleanupOutcome::Removed => report.folders_removed.push(staging),
            CleanupOutcome::Retained => report.folders_retained.push(staging),
            CleanupOutcome::RemovalFailed { reason } => {
                report.record_failure(Stage::Cleanup, None, Some(date_folder), None, reason);
                report.folders_retained.push(staging);
            }
        }
    }

    async fn download_batch(
        &self,
        batch: &FolderBatch<'_>,
        root: &Path,
        report: &mut RunReport,
    ) -> Vec<StagedFile> {
        let mut staged = Vec::new();
        for recording in &batch.recordings {
            for file in self.downloads.download(recording, root).await {
                match file.outcome {
                    FileOutcome::Downloaded { .. } => {
                        report.files_downloaded += 1;
                        if let Some(file_name) = file.file_name {
                            staged.push(StagedFile {
                                topic: recording.topic.clone(),
                                file_name,
                            });
                        }
                    }
                    FileOutcome::SkippedDryRun { .. } => report.files_dry_run += 1,
                    FileOutcome::SkippedUnknownType => report.files_unknown_type += 1,
                    FileOutcome::Failed { reason } => {
                        report.files_failed += 1;
                        report.record_failure(
                            Stage::Download,
                            Some(&recording.topic),
                            Some(&batch.date_folder),
                            file.file_name.as_deref(),
                            reason,
                        );
                    }
                }
            }
        }
        staged
    }
}

/// Every finished run ends the log with its summary line.
fn finish(report: RunReport) -> RunReport {
    let report = report.finalize();
    info!("{}", report.summary_line());
    report
}

fn abort(report: RunReport, err: FatalError, stage: Stage) -> RunReport {
    let stage = match &err {
        FatalError::Auth(_) => Stage::Auth,
        FatalError::Environment(_) => Stage::EnvironmentCheck,
        FatalError::NotFound(_) | FatalError::Provider(_) => stage,
    };
    abort_at(report, stage, err.to_string())
}

fn abort_at(report: RunReport, stage: Stage, reason: String) -> RunReport {
    warn!(stage = %stage, "Run aborted: {}", reason);
    let report = report.abort(stage, reason);
    info!("{}", report.summary_line());
    report
}

fn group_by_date_folder(recordings: &[RecordingMeta]) -> Vec<FolderBatch<'_>> {
    let mut batches: Vec<FolderBatch<'_>> = Vec::new();
    for recording in recordings {
        let date_folder = recording.date_folder();
        match batches.iter_mut().find(|b| b.date_folder == date_folder) {
            Some(batch) => batch.recordings.push(recording),
            None => batches.push(FolderBatch {
                date_folder,
                recordings: vec![recording],
            }),
        }
    }
    batches
}
