//! The externally visible outcome of one run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Auth,
    UserResolution,
    Listing,
    EnvironmentCheck,
    Download,
    Transfer,
    Notify,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Auth => "auth",
            Stage::UserResolution => "user resolution",
            Stage::Listing => "listing",
            Stage::EnvironmentCheck => "environment check",
            Stage::Download => "download",
            Stage::Transfer => "transfer",
            Stage::Notify => "notify",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Still running. Never returned by a finished run.
    InProgress,
    Completed,
    CompletedWithFailures,
    Aborted { stage: Stage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: Stage,
    pub topic: Option<String>,
    pub date_folder: Option<String>,
    pub file_name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub dry_run: bool,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub window_from: Option<NaiveDate>,
    pub window_to: Option<NaiveDate>,

    pub recordings_seen: usize,
    pub recordings_matched: usize,
    pub recordings_too_short: usize,

    /// Files of known type belonging to matched recordings.
    pub files_planned: usize,
    pub files_downloaded: usize,
    pub files_dry_run: usize,
    pub files_unknown_type: usize,
    pub files_failed: usize,
    pub files_transferred: usize,

    pub notifications_sent: usize,
    pub notifications_skipped: usize,
    pub notifications_failed: usize,

    pub folders_removed: Vec<PathBuf>,
    pub folders_retained: Vec<PathBuf>,
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: run_id.into(),
            dry_run,
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            window_from: None,
            window_to: None,
            recordings_seen: 0,
            recordings_matched: 0,
            recordings_too_short: 0,
            files_planned: 0,
            files_downloaded: 0,
            files_dry_run: 0,
            files_unknown_type: 0,
            files_failed: 0,
            files_transferred: 0,
            notifications_sent: 0,
            notifications_skipped: 0,
            notifications_failed: 0,
            folders_removed: Vec::new(),
            folders_retained: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_failure(
        &mut self,
        stage: Stage,
        topic: Option<&str>,
        date_folder: Option<&str>,
        file_name: Option<&str>,
        reason: impl Into<String>,
    ) {
        self.failures.push(Failure {
            stage,
            topic: topic.map(str::to_string),
            date_folder: date_folder.map(str::to_string),
            file_name: file_name.map(str::to_string),
            reason: reason.into(),
        });
    }

    /// End the run early at a precondition stage.
    pub fn abort(mut self, stage: Stage, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.record_failure(stage, None, None, None, reason.clone());
        self.status = RunStatus::Aborted { stage, reason };
        self.finished_at = Some(Utc::now());
        self
    }

    /// Failures that affect the run status. Cleanup failures only leave stale
    /// local files behind, so they are reported but never counted.
    pub fn run_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.stage != Stage::Cleanup)
            .count()
    }

    pub fn finalize(mut self) -> Self {
        self.status = if self.run_failures() == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithFailures
        };
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted { .. })
    }

    pub fn summary_line(&self) -> String {
        let status = match &self.status {
            RunStatus::InProgress => "in progress".to_string(),
            RunStatus::Completed => "completed".to_string(),
            RunStatus::CompletedWithFailures => {
                format!("completed with {} failure(s)", self.run_failures())
            }
            RunStatus::Aborted { stage, reason } => format!("aborted at {stage}: {reason}"),
        };
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        format!("{prefix}Run {} {}", self.run_id, status)
    }

    /// Multi-line report for terminal output.
    pub fn render_text(&self) -> String {
        let mut lines = vec![self.summary_line()];

        if let (Some(from), Some(to)) = (self.window_from, self.window_to) {
            lines.push(format!("  Window:        {from} .. {to}"));
        }
        lines.push(format!(
            "  Recordings:    {} seen, {} matched, {} too short",
            self.recordings_seen, self.recordings_matched, self.recordings_too_short
        ));
        if self.dry_run {
            lines.push(format!(
                "  Files:         {} planned, {} would download, {} unknown type",
                self.files_planned, self.files_dry_run, self.files_unknown_type
            ));
        } else {
            lines.push(format!(
                "  Files:         {} planned, {} downloaded, {} failed, {} unknown type, {} transferred",
                self.files_planned,
                self.files_downloaded,
                self.files_failed,
                self.files_unknown_type,
                self.files_transferred
            ));
            lines.push(format!(
                "  Notifications: {} sent, {} skipped, {} failed",
                self.notifications_sent, self.notifications_skipped, self.notifications_failed
            ));
        }

        for folder in &self.folders_retained {
            lines.push(format!("  Retained:      {}", folder.display()));
        }

        if !self.failures.is_empty() {
            lines.push("  Failures:".to_string());
            for failure in &self.failures {
                let mut context = Vec::new();
                if let Some(topic) = &failure.topic {
                    context.push(topic.clone());
                }
                if let Some(folder) = &failure.date_folder {
                    context.push(folder.clone());
                }
                if let Some(file) = &failure.file_name {
                    context.push(file.clone());
                }
                let context = if context.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", context.join(" / "))
                };
                lines.push(format!(
                    "    - {}{}: {}",
                    failure.stage, context, failure.reason
                ));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_without_failures_is_completed() {
        let report = RunReport::new("run-1", false).finalize();
        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_failures_downgrade_status() {
        let mut report = RunReport::new("run-1", false);
        report.record_failure(
            Stage::Download,
            Some("Weekly Sync"),
            Some("2024-01-15"),
            Some("a.mp4"),
            "HTTP 500",
        );
        let report = report.finalize();

        assert_eq!(report.status, RunStatus::CompletedWithFailures);
        assert!(report
            .render_text()
            .contains("download [Weekly Sync / 2024-01-15 / a.mp4]: HTTP 500"));
    }

    #[test]
    fn test_cleanup_failure_is_reported_but_does_not_downgrade() {
        let mut report = RunReport::new("run-1", false);
        report.record_failure(
            Stage::Cleanup,
            None,
            Some("2024-01-15"),
            None,
            "permission denied",
        );
        let report = report.finalize();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.failures.len(), 1);
        assert!(report
            .render_text()
            .contains("cleanup [2024-01-15]: permission denied"));
    }

    #[test]
    fn test_abort_names_stage() {
        let report = RunReport::new("run-1", false).abort(Stage::UserResolution, "not found");

        assert!(report.is_aborted());
        assert_eq!(report.files_downloaded, 0);
        assert_eq!(
            report.summary_line(),
            "Run run-1 aborted at user resolution: not found"
        );
    }

    #[test]
    fn test_serializes_status_with_tag() {
        let report = RunReport::new("run-1", true).abort(Stage::Auth, "bad secret");
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["status"]["state"], "aborted");
        assert_eq!(value["status"]["stage"], "auth");
        assert_eq!(value["dry_run"], true);
    }
}
