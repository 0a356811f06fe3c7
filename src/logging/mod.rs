//! Tracing setup: human-readable console output plus an optional JSON event
//! log with one file per day.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::global;

/// `<logs_dir>/zoom-drive-sync-YYYYMMDD.log`
pub fn event_log_path(logs_dir: &Path, date: NaiveDate) -> PathBuf {
    logs_dir.join(format!("zoom-drive-sync-{}.log", date.format("%Y%m%d")))
}

fn open_event_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create log directory")?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open event log {}", path.display()))
}

/// Install the global subscriber. Console output goes to stderr so stdout
/// stays clean for reports. Returns the event log path when one is active.
pub fn init(verbose: bool, event_log: bool) -> Option<PathBuf> {
    let log_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut open_error = None;
    let event_file = if event_log {
        let opened = global::logs_dir()
            .map(|dir| event_log_path(&dir, Local::now().date_naive()))
            .and_then(|path| open_event_log(&path).map(|file| (path, file)));
        match opened {
            Ok(opened) => Some(opened),
            Err(err) => {
                open_error = Some(err);
                None
            }
        }
    } else {
        None
    };

    let (path, json_layer) = match event_file {
        Some((path, file)) => (
            Some(path),
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(Arc::new(file)),
            ),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(json_layer)
        .init();

    if let Some(err) = open_error {
        warn!("Event log disabled: {:#}", err);
    }
    path
}
