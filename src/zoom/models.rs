use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl ApiUser {
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// One page of `GET /users/{id}/recordings`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingsPage {
    #[serde(default)]
    pub meetings: Vec<Meeting>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub total_records: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meeting {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub topic: String,
    pub start_time: DateTime<Utc>,
    /// Minutes, as reported by Zoom.
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub recording_files: Vec<RecordingFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub recording_type: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub recording_start: Option<String>,
    #[serde(default)]
    pub recording_end: Option<String>,
}

impl RecordingFile {
    pub fn recording_end_utc(&self) -> Option<DateTime<Utc>> {
        parse_instant(self.recording_end.as_deref()?)
    }
}

/// Zoom timestamps are RFC 3339, but empty strings show up for files that
/// are still processing.
fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|instant| instant.with_timezone(&Utc))
}
