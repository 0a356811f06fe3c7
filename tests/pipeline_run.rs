use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use indicatif::ProgressBar;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use zoom_drive_sync::auth::{Credential, TokenSource};
use zoom_drive_sync::catalog::{RecordingSource, UserRef};
use zoom_drive_sync::config::{Config, RunRequest, RunSettings};
use zoom_drive_sync::download::{Fetched, Fetcher};
use zoom_drive_sync::error::{
    AuthError, FileDownloadError, NotFoundError, NotifyError, ProviderError, TransferError,
};
use zoom_drive_sync::notify::{Notification, NotificationSink};
use zoom_drive_sync::pipeline::{Components, Pipeline, RunReport, RunStatus, Stage};
use zoom_drive_sync::retry::RetryPolicy;
use zoom_drive_sync::transfer::TransferTool;
use zoom_drive_sync::zoom::Meeting;

struct FakeTokens {
    reject: bool,
}

#[async_trait]
impl TokenSource for FakeTokens {
    async fn get_token(&self) -> Result<Credential, AuthError> {
        if self.reject {
            return Err(AuthError::Rejected {
                status: 401,
                body: r#"{"reason":"Invalid client_id or client_secret"}"#.to_string(),
            });
        }
        Ok(Credential {
            access_token: "token".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

struct FakeSource {
    meetings: Vec<Meeting>,
    known_user: bool,
}

#[async_trait]
impl RecordingSource for FakeSource {
    async fn resolve_user(&self, email: &str) -> Result<UserRef, ProviderError> {
        if !self.known_user {
            return Err(NotFoundError {
                email: email.to_string(),
            }
            .into());
        }
        Ok(UserRef {
            id: "user123".to_string(),
            email: email.to_string(),
            display_name: Some("Test User".to_string()),
        })
    }

    async fn list_recordings(
        &self,
        _user: &UserRef,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<Meeting>, ProviderError> {
        Ok(self.meetings.clone())
    }
}

#[derive(Default)]
struct FakeFetcher {
    /// Downloads whose URL contains one of these fragments answer HTTP 404.
    failing_urls: Vec<String>,
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn prepare(&self, dir: &Path) -> Result<(), FileDownloadError> {
        std::fs::create_dir_all(dir).map_err(|source| FileDownloadError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        _expected_size: Option<u64>,
        _progress: &ProgressBar,
    ) -> Result<Fetched, FileDownloadError> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.failing_urls.iter().any(|fragment| url.contains(fragment.as_str())) {
            return Err(FileDownloadError::Status {
                status: 404,
                body: "File does not exist".to_string(),
            });
        }
        std::fs::write(dest, url.as_bytes()).map_err(|source| FileDownloadError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(Fetched::Written {
            bytes: url.len() as u64,
        })
    }
}

#[derive(Default)]
struct FakeTransfer {
    environment_broken: bool,
    failing_folders: Vec<String>,
    copies: Mutex<Vec<String>>,
    copied_dirs: Mutex<HashMap<String, PathBuf>>,
}

#[async_trait]
impl TransferTool for FakeTransfer {
    fn destination(&self, date_folder: &str) -> String {
        format!("recordingdrive:Recordings/{date_folder}")
    }

    async fn check_environment(&self) -> Result<(), TransferError> {
        if self.environment_broken {
            return Err(TransferError::RemoteNotConfigured {
                remote: "recordingdrive".to_string(),
                available: Vec::new(),
            });
        }
        Ok(())
    }

    async fn copy_directory(&self, local: &Path, date_folder: &str) -> Result<(), TransferError> {
        self.copies.lock().unwrap().push(date_folder.to_string());
        if self.failing_folders.iter().any(|f| f == date_folder) {
            return Err(TransferError::CommandFailed {
                command: "rclone copy".to_string(),
                status: "exit status: 7".to_string(),
                stderr: "quota exceeded".to_string(),
            });
        }
        self.copied_dirs
            .lock()
            .unwrap()
            .insert(date_folder.to_string(), local.to_path_buf());
        Ok(())
    }

    async fn list_remote_ids(
        &self,
        date_folder: &str,
    ) -> Result<HashMap<String, Option<String>>, TransferError> {
        let dir = self.copied_dirs.lock().unwrap().get(date_folder).cloned();
        let mut ids = HashMap::new();
        if let Some(dir) = dir {
            for entry in std::fs::read_dir(dir).unwrap() {
                let name = entry.unwrap().file_name().to_string_lossy().into_owned();
                ids.insert(name.clone(), Some(format!("id-{name}")));
            }
        }
        Ok(ids)
    }
}

#[derive(Default)]
struct FakeSink {
    rejecting: bool,
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for FakeSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.rejecting {
            return Err(NotifyError::Rejected {
                status: 403,
                body: "invalid_token".to_string(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn file(kind: &str, url: &str, start: &str, end: &str) -> serde_json::Value {
    json!({
        "id": url,
        "recording_type": kind,
        "download_url": format!("https://zoom.us/rec/download/{url}"),
        "file_size": 1024,
        "recording_start": start,
        "recording_end": end
    })
}

fn meeting(topic: &str, start: &str, end: &str, duration: u32, files: &[(&str, &str)]) -> Meeting {
    serde_json::from_value(json!({
        "uuid": format!("uuid-{topic}-{start}"),
        "topic": topic,
        "start_time": start,
        "duration": duration,
        "recording_files": files
            .iter()
            .map(|(kind, url)| file(kind, url, start, end))
            .collect::<Vec<_>>()
    }))
    .unwrap()
}

/// Two long recordings on 15 Jan (Melbourne), one on 17 Jan, one short
/// recording and one unrelated meeting.
fn catalog() -> Vec<Meeting> {
    vec![
        meeting(
            "Weekly Sync",
            "2024-01-15T10:00:00Z",
            "2024-01-15T10:45:00Z",
            45,
            &[
                ("shared_screen_with_speaker_view", "a-video"),
                ("audio_only", "a-audio"),
                ("closed_caption", "a-captions"),
                ("chat_file", "a-chat"),
                ("gallery_view", "a-gallery"),
            ],
        ),
        meeting(
            "Weekly Sync",
            "2024-01-15T12:00:00Z",
            "2024-01-15T12:30:00Z",
            30,
            &[("shared_screen_with_speaker_view", "b-video")],
        ),
        meeting(
            "Weekly Sync",
            "2024-01-16T01:00:00Z",
            "2024-01-16T01:04:00Z",
            3,
            &[
                ("shared_screen_with_speaker_view", "short-video"),
                ("audio_only", "short-audio"),
            ],
        ),
        meeting(
            "Board Meeting",
            "2024-01-16T03:00:00Z",
            "2024-01-16T04:00:00Z",
            60,
            &[("shared_screen_with_speaker_view", "board-video")],
        ),
        meeting(
            "weekly sync (rescheduled)",
            "2024-01-17T02:00:00Z",
            "2024-01-17T03:00:00Z",
            60,
            &[
                ("shared_screen_with_speaker_view", "c-video"),
                ("audio_only", "c-audio"),
            ],
        ),
    ]
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    fetcher: Arc<FakeFetcher>,
    transfer: Arc<FakeTransfer>,
    sink: Arc<FakeSink>,
    pipeline: Pipeline,
}

struct Scenario {
    dry_run: bool,
    reject_token: bool,
    known_user: bool,
    /// Bypasses settings validation to reach the controller directly.
    lookback_days: Option<u32>,
    fetcher: FakeFetcher,
    transfer: FakeTransfer,
    sink: FakeSink,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            dry_run: false,
            reject_token: false,
            known_user: true,
            lookback_days: None,
            fetcher: FakeFetcher::default(),
            transfer: FakeTransfer::default(),
            sink: FakeSink::default(),
        }
    }
}

fn harness(scenario: Scenario) -> Harness {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("staging");

    let mut settings = RunSettings::assemble(
        &Config::default(),
        RunRequest {
            meeting_name: "Weekly Sync".to_string(),
            email: "test@example.com".to_string(),
            dry_run: scenario.dry_run,
            download_dir: Some(root.clone()),
            ..Default::default()
        },
    )
    .unwrap();
    settings.retry = RetryPolicy::none();
    if let Some(days) = scenario.lookback_days {
        settings.lookback_days = days;
    }

    let fetcher = Arc::new(scenario.fetcher);
    let transfer = Arc::new(scenario.transfer);
    let sink = Arc::new(scenario.sink);

    let pipeline = Pipeline::new(
        settings,
        Components {
            tokens: Arc::new(FakeTokens {
                reject: scenario.reject_token,
            }),
            source: Arc::new(FakeSource {
                meetings: catalog(),
                known_user: scenario.known_user,
            }),
            fetcher: fetcher.clone(),
            transfer_tool: transfer.clone(),
            notification_sink: Some(sink.clone() as Arc<dyn NotificationSink>),
        },
    );

    Harness {
        _dir: dir,
        root,
        fetcher,
        transfer,
        sink,
        pipeline,
    }
}

fn sent_files(sink: &FakeSink) -> Vec<String> {
    sink.sent
        .lock()
        .unwrap()
        .iter()
        .map(|n| n.file_name.clone())
        .collect()
}

#[tokio::test]
async fn test_live_run_processes_every_folder() {
    let h = harness(Scenario::default());

    let report = h.pipeline.run().await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.recordings_seen, 5);
    assert_eq!(report.recordings_matched, 3);
    assert_eq!(report.recordings_too_short, 1);
    assert_eq!(report.files_planned, 7);
    assert_eq!(report.files_downloaded, 7);
    assert_eq!(report.files_unknown_type, 1);
    assert_eq!(report.files_transferred, 7);
    assert_eq!(report.notifications_sent, 3);
    assert_eq!(report.folders_removed.len(), 2);
    assert!(report.folders_retained.is_empty());

    // One copy per date folder, in provider order.
    assert_eq!(
        *h.transfer.copies.lock().unwrap(),
        vec!["2024-01-15".to_string(), "2024-01-17".to_string()]
    );
    assert!(!h.root.join("2024-01-15").exists());
    assert!(!h.root.join("2024-01-17").exists());
}

#[tokio::test]
async fn test_short_recordings_are_never_downloaded() {
    let h = harness(Scenario::default());

    h.pipeline.run().await;

    let urls = h.fetcher.urls.lock().unwrap();
    assert!(!urls.iter().any(|url| url.contains("short")));
    assert!(!urls.iter().any(|url| url.contains("board")));
    assert!(!urls.iter().any(|url| url.contains("gallery")));
}

#[tokio::test]
async fn test_only_primary_videos_are_announced_with_links() {
    let h = harness(Scenario::default());

    h.pipeline.run().await;

    let sent = h.sink.sent.lock().unwrap();
    let names: Vec<&str> = sent.iter().map(|n| n.file_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "15 January 2024 2100 - Weekly Sync.mp4",
            "15 January 2024 2300 - Weekly Sync.mp4",
            "17 January 2024 1300 - weekly sync (rescheduled).mp4",
        ]
    );
    assert_eq!(
        sent[0].link.as_deref(),
        Some("https://drive.google.com/file/d/id-15 January 2024 2100 - Weekly Sync.mp4/view")
    );
}

#[tokio::test]
async fn test_failed_transfer_retains_staging_and_skips_notifications() {
    let h = harness(Scenario {
        transfer: FakeTransfer {
            failing_folders: vec!["2024-01-15".to_string()],
            ..FakeTransfer::default()
        },
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    let staging = h.root.join("2024-01-15");
    assert!(staging.join("15 January 2024 2100 - Weekly Sync.mp4").exists());
    assert_eq!(report.folders_retained, vec![staging]);
    assert_eq!(report.folders_removed, vec![h.root.join("2024-01-17")]);

    assert_eq!(
        sent_files(&h.sink),
        vec!["17 January 2024 1300 - weekly sync (rescheduled).mp4".to_string()]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Transfer);
    assert_eq!(report.failures[0].date_folder.as_deref(), Some("2024-01-15"));
}

#[tokio::test]
async fn test_dry_run_matches_live_counts_without_side_effects() {
    let live = harness(Scenario::default()).pipeline.run().await;

    let h = harness(Scenario {
        dry_run: true,
        ..Scenario::default()
    });
    let dry = h.pipeline.run().await;

    assert!(dry.dry_run);
    assert_eq!(dry.status, RunStatus::Completed);
    assert_eq!(dry.recordings_seen, live.recordings_seen);
    assert_eq!(dry.recordings_matched, live.recordings_matched);
    assert_eq!(dry.recordings_too_short, live.recordings_too_short);
    assert_eq!(dry.files_planned, live.files_planned);
    assert_eq!(dry.files_dry_run, live.files_downloaded);
    assert_eq!(dry.files_unknown_type, live.files_unknown_type);

    assert!(h.fetcher.urls.lock().unwrap().is_empty());
    assert!(h.transfer.copies.lock().unwrap().is_empty());
    assert!(h.sink.sent.lock().unwrap().is_empty());
    assert!(!h.root.exists());
}

#[tokio::test]
async fn test_failed_download_is_reported_and_siblings_still_transfer() {
    let h = harness(Scenario {
        fetcher: FakeFetcher {
            failing_urls: vec!["a-audio".to_string()],
            ..FakeFetcher::default()
        },
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_downloaded, 6);
    assert_eq!(report.files_transferred, 6);
    assert_eq!(report.notifications_sent, 3);

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.stage, Stage::Download);
    assert_eq!(failure.topic.as_deref(), Some("Weekly Sync"));
    assert_eq!(failure.date_folder.as_deref(), Some("2024-01-15"));
    assert_eq!(
        failure.file_name.as_deref(),
        Some("15 January 2024 2100 - Weekly Sync.m4a")
    );
    assert!(failure.reason.contains("404"));

    assert_eq!(
        *h.transfer.copies.lock().unwrap(),
        vec!["2024-01-15".to_string(), "2024-01-17".to_string()]
    );
    assert_eq!(
        report.folders_removed,
        vec![h.root.join("2024-01-15"), h.root.join("2024-01-17")]
    );
    assert!(report.folders_retained.is_empty());
}

#[tokio::test]
async fn test_rejected_notifications_never_block_cleanup() {
    let h = harness(Scenario {
        sink: FakeSink {
            rejecting: true,
            ..FakeSink::default()
        },
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(report.notifications_failed, 3);
    assert_eq!(report.files_transferred, 7);

    let notify_failures: Vec<_> = report
        .failures
        .iter()
        .filter(|failure| failure.stage == Stage::Notify)
        .collect();
    assert_eq!(notify_failures.len(), 3);
    assert_eq!(
        notify_failures[0].file_name.as_deref(),
        Some("15 January 2024 2100 - Weekly Sync.mp4")
    );
    assert_eq!(notify_failures[0].topic.as_deref(), Some("Weekly Sync"));

    assert_eq!(
        report.folders_removed,
        vec![h.root.join("2024-01-15"), h.root.join("2024-01-17")]
    );
    assert!(!h.root.join("2024-01-15").exists());
    assert!(!h.root.join("2024-01-17").exists());
}

fn assert_zero_processed(report: &RunReport) {
    assert_eq!(report.files_downloaded, 0);
    assert_eq!(report.files_transferred, 0);
    assert_eq!(report.notifications_sent, 0);
}

#[tokio::test]
async fn test_auth_failure_aborts_before_listing() {
    let h = harness(Scenario {
        reject_token: true,
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    assert!(report.is_aborted());
    match &report.status {
        RunStatus::Aborted { stage, reason } => {
            assert_eq!(*stage, Stage::Auth);
            assert!(reason.contains("Invalid client_id"));
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(report.recordings_seen, 0);
    assert_zero_processed(&report);
}

#[tokio::test]
async fn test_unknown_user_aborts() {
    let h = harness(Scenario {
        known_user: false,
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    assert!(matches!(
        report.status,
        RunStatus::Aborted {
            stage: Stage::UserResolution,
            ..
        }
    ));
    assert_zero_processed(&report);
    assert!(h.fetcher.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unrepresentable_window_aborts_instead_of_panicking() {
    let h = harness(Scenario {
        lookback_days: Some(u32::MAX),
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    match &report.status {
        RunStatus::Aborted { stage, reason } => {
            assert_eq!(*stage, Stage::Listing);
            assert!(reason.contains("out of range"));
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_zero_processed(&report);
    assert!(h.fetcher.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_broken_environment_aborts_before_downloads() {
    let h = harness(Scenario {
        transfer: FakeTransfer {
            environment_broken: true,
            ..FakeTransfer::default()
        },
        ..Scenario::default()
    });

    let report = h.pipeline.run().await;

    assert!(matches!(
        report.status,
        RunStatus::Aborted {
            stage: Stage::EnvironmentCheck,
            ..
        }
    ));
    assert_zero_processed(&report);
    assert!(h.fetcher.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rerun_after_cleanup_downloads_again_under_same_names() {
    let h = harness(Scenario::default());

    h.pipeline.run().await;
    let first: Vec<String> = sent_files(&h.sink);
    h.pipeline.run().await;
    let all = sent_files(&h.sink);

    assert_eq!(all.len(), first.len() * 2);
    assert_eq!(&all[first.len()..], first.as_slice());
}

/// Collects formatted log output written during a run.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLog {
    fn last_line(&self) -> String {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .last()
            .unwrap_or_default()
            .to_string()
    }
}

async fn run_capturing_log(pipeline: &Pipeline) -> (RunReport, String) {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let report = pipeline.run().await;
    (report, log.last_line())
}

#[tokio::test]
async fn test_every_run_logs_its_summary_last() {
    let completed = harness(Scenario::default());
    let (report, last) = run_capturing_log(&completed.pipeline).await;
    assert!(last.ends_with(&report.summary_line()), "last line: {last}");
    assert!(last.contains("completed"));

    let aborted = harness(Scenario {
        reject_token: true,
        ..Scenario::default()
    });
    let (report, last) = run_capturing_log(&aborted.pipeline).await;
    assert!(report.is_aborted());
    assert!(last.ends_with(&report.summary_line()), "last line: {last}");
    assert!(last.contains("aborted at auth"));
}
