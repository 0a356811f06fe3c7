//! Recording discovery and filtering.
//!
//! The catalog pulls the full listing for a date window from a
//! [`RecordingSource`], localizes every timestamp into the run's timezone
//! and only then applies the meeting-name and minimum-duration filters.

pub mod model;

pub use model::{
    sanitize_component, FileKind, FileMeta, RecordingMeta, UserRef, PRIMARY_VIDEO_EXTENSION,
};

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RunSettings;
use crate::error::ProviderError;
use crate::zoom::Meeting;

/// Where recordings come from. Implemented by the Zoom client.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    async fn resolve_user(&self, email: &str) -> Result<UserRef, ProviderError>;

    /// Every recording in `[from, to]`, across all pages, in provider order.
    async fn list_recordings(
        &self,
        user: &UserRef,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Meeting>, ProviderError>;
}

#[derive(Debug, Clone, Default)]
pub struct CatalogListing {
    /// Recordings returned by the provider before any filtering.
    pub seen: usize,
    /// Name matches long enough to download.
    pub matched: Vec<RecordingMeta>,
    /// Name matches excluded by the minimum duration.
    pub too_short: Vec<RecordingMeta>,
}

pub struct RecordingCatalog {
    source: Arc<dyn RecordingSource>,
    timezone: Tz,
    meeting_name: String,
    min_duration_minutes: u32,
}

impl RecordingCatalog {
    pub fn new(source: Arc<dyn RecordingSource>, settings: &RunSettings) -> Self {
        Self {
            source,
            timezone: settings.timezone,
            meeting_name: settings.meeting_name.to_lowercase(),
            min_duration_minutes: settings.min_duration_minutes,
        }
    }

    /// Today's date in the run's timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    pub async fn resolve_user(&self, email: &str) -> Result<UserRef, ProviderError> {
        let user = self.source.resolve_user(email).await?;
        info!(
            "Resolved Zoom user {} ({})",
            user.email,
            user.display_name.as_deref().unwrap_or(&user.id)
        );
        Ok(user)
    }

    pub async fn list_recordings(
        &self,
        user: &UserRef,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CatalogListing, ProviderError> {
        let meetings = self.source.list_recordings(user, from, to).await?;
        info!(
            "Found {} recordings between {} and {}",
            meetings.len(),
            from,
            to
        );

        let mut listing = CatalogListing {
            seen: meetings.len(),
            ..CatalogListing::default()
        };

        for meeting in &meetings {
            if !meeting.topic.to_lowercase().contains(&self.meeting_name) {
                continue;
            }

            let recording = localize(meeting, self.timezone);
            let effective = recording.effective_duration_minutes();
            if effective < f64::from(self.min_duration_minutes) {
                info!(
                    topic = %recording.topic,
                    date_folder = %recording.date_folder(),
                    "Skipping short recording ({:.1} min < {} min)",
                    effective,
                    self.min_duration_minutes
                );
                listing.too_short.push(recording);
            } else {
                debug!(
                    topic = %recording.topic,
                    "Matched recording ({:.1} min, {} files)",
                    effective,
                    recording.files.len()
                );
                listing.matched.push(recording);
            }
        }

        Ok(listing)
    }
}

/// `[today - lookback_days, today]`, or `None` when the start falls outside
/// the calendar chrono can represent.
pub fn date_window(today: NaiveDate, lookback_days: u32) -> Option<(NaiveDate, NaiveDate)> {
    let from = today.checked_sub_days(Days::new(u64::from(lookback_days)))?;
    Some((from, today))
}

/// Convert a provider meeting into a recording with local timestamps.
pub fn localize(meeting: &Meeting, timezone: Tz) -> RecordingMeta {
    let mut type_totals: HashMap<String, usize> = HashMap::new();
    for file in &meeting.recording_files {
        *type_totals.entry(recording_type(file)).or_default() += 1;
    }

    let mut type_seen: HashMap<String, usize> = HashMap::new();
    let mut files = Vec::with_capacity(meeting.recording_files.len());
    for file in &meeting.recording_files {
        let file_type = recording_type(file);
        let Some(download_url) = file.download_url.clone().filter(|url| !url.is_empty()) else {
            warn!(
                topic = %meeting.topic,
                "Recording file of type '{}' has no download URL, skipping",
                file_type
            );
            continue;
        };

        let index = type_seen.entry(file_type.clone()).or_default();
        *index += 1;
        let part = (type_totals.get(&file_type).copied().unwrap_or(0) > 1).then_some(*index);

        files.push(FileMeta {
            file_id: file.id.clone(),
            kind: FileKind::from_recording_type(&file_type),
            file_type,
            download_url,
            file_size: file.file_size,
            part,
        });
    }

    let end = meeting
        .recording_files
        .iter()
        .filter_map(|file| file.recording_end_utc())
        .max()
        .map(|end| end.with_timezone(&timezone));

    RecordingMeta {
        uid: meeting.uuid.clone(),
        topic: meeting.topic.clone(),
        start: meeting.start_time.with_timezone(&timezone),
        end,
        reported_duration_minutes: meeting.duration,
        files,
    }
}

fn recording_type(file: &crate::zoom::RecordingFile) -> String {
    file.recording_type
        .as_deref()
        .or(file.file_type.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_lowercase()
}
