//! Zoom REST API client.

pub mod client;
pub mod models;

pub use client::ZoomClient;
pub use models::{ApiUser, Meeting, RecordingFile, RecordingsPage};
