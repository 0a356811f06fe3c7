//! Localized recording snapshot used by every downstream stage.

use chrono::DateTime;
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Extension that marks the primary meeting video.
pub const PRIMARY_VIDEO_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Recording file types we know how to name and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    SpeakerViewWithCaptions,
    SpeakerView,
    AudioOnly,
    VideoOnly,
    ClosedCaption,
    Chat,
}

impl FileKind {
    pub fn from_recording_type(recording_type: &str) -> Option<Self> {
        match recording_type.trim().to_lowercase().as_str() {
            "shared_screen_with_speaker_view(cc)" => Some(Self::SpeakerViewWithCaptions),
            "shared_screen_with_speaker_view" => Some(Self::SpeakerView),
            "audio_only" => Some(Self::AudioOnly),
            "video_only(m4s)" => Some(Self::VideoOnly),
            "closed_caption" => Some(Self::ClosedCaption),
            "chat_file" => Some(Self::Chat),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::SpeakerViewWithCaptions | Self::SpeakerView => "mp4",
            Self::AudioOnly => "m4a",
            Self::VideoOnly => "m4s",
            Self::ClosedCaption => "vtt",
            Self::Chat => "txt",
        }
    }

    /// Distinguishes kinds that share an extension.
    fn label(&self) -> Option<&'static str> {
        match self {
            Self::SpeakerViewWithCaptions => Some("cc"),
            _ => None,
        }
    }

    pub fn is_primary_video(&self) -> bool {
        self.extension() == PRIMARY_VIDEO_EXTENSION
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMeta {
    pub file_id: Option<String>,
    /// Provider's `recording_type`, lowercased.
    pub file_type: String,
    pub kind: Option<FileKind>,
    pub download_url: String,
    /// Size reported by the provider, used to verify downloads.
    pub file_size: Option<u64>,
    /// 1-based index when a recording has several files of this type.
    pub part: Option<usize>,
}

impl FileMeta {
    pub fn extension(&self) -> Option<&'static str> {
        self.kind.map(|kind| kind.extension())
    }

    pub fn is_primary_video(&self) -> bool {
        self.kind.map(|kind| kind.is_primary_video()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMeta {
    pub uid: String,
    pub topic: String,
    pub start: DateTime<Tz>,
    pub end: Option<DateTime<Tz>>,
    pub reported_duration_minutes: u32,
    pub files: Vec<FileMeta>,
}

impl RecordingMeta {
    /// Minutes between start and the latest file end, if known.
    pub fn computed_duration_minutes(&self) -> Option<f64> {
        let end = self.end?;
        let seconds = (end - self.start).num_seconds();
        (seconds >= 0).then(|| seconds as f64 / 60.0)
    }

    /// The larger of the reported and computed duration.
    pub fn effective_duration_minutes(&self) -> f64 {
        let reported = f64::from(self.reported_duration_minutes);
        self.computed_duration_minutes()
            .map(|computed| computed.max(reported))
            .unwrap_or(reported)
    }

    /// `YYYY-MM-DD` staging and remote folder for this recording.
    pub fn date_folder(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// Deterministic local/remote file name, or `None` for unknown types.
    ///
    /// `15 January 2024 2100 - Weekly Sync (cc)_2.mp4`
    pub fn file_name(&self, file: &FileMeta) -> Option<String> {
        let kind = file.kind?;
        let mut name = format!(
            "{} - {}",
            self.start.format("%d %B %Y %H%M"),
            sanitize_component(&self.topic)
        );
        if let Some(label) = kind.label() {
            name.push_str(&format!(" ({label})"));
        }
        if let Some(part) = file.part {
            name.push_str(&format!("_{part}"));
        }
        name.push('.');
        name.push_str(kind.extension());
        Some(name)
    }
}

/// Replace characters that are unsafe in local or remote paths.
pub fn sanitize_component(raw: &str) -> String {
    static HOSTILE: OnceLock<Option<Regex>> = OnceLock::new();
    let hostile = HOSTILE.get_or_init(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]+"#).ok());
    let cleaned = match hostile {
        Some(re) => re.replace_all(raw.trim(), "-").into_owned(),
        None => raw.trim().replace('/', "-"),
    };
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned.to_string()
    }
}
