//! Error taxonomy for the recording pipeline.
//!
//! Precondition failures ([`FatalError`]) abort a run. Everything else is
//! scoped to one file or one date folder and ends up as a line in the run
//! report instead of propagating.

use std::path::PathBuf;
use thiserror::Error;

/// Whether an operation is worth repeating after this error.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

fn status_is_retryable(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

fn transport_is_retryable(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        return true;
    }
    err.status()
        .map(|status| status_is_retryable(status.as_u16()))
        .unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Zoom credential: {0}")]
    MissingCredential(&'static str),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed token response: {0}")]
    Malformed(String),
}

impl Retryable for AuthError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => transport_is_retryable(err),
            Self::Rejected { status, .. } => status_is_retryable(*status),
            Self::MissingCredential(_) | Self::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Error)]
#[error("Zoom user '{email}' not found")]
pub struct NotFoundError {
    pub email: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("Zoom API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Zoom API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed Zoom API response: {0}")]
    Malformed(String),
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(err) => err.is_retryable(),
            Self::Transport(err) => transport_is_retryable(err),
            Self::Status { status, .. } => status_is_retryable(*status),
            Self::NotFound(_) | Self::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum FileDownloadError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("download request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("download returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("download incomplete: expected {expected} bytes, received {actual}")]
    Incomplete { expected: u64, actual: u64 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Retryable for FileDownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(err) => err.is_retryable(),
            Self::Transport(err) => transport_is_retryable(err),
            Self::Status { status, .. } => status_is_retryable(*status),
            Self::Incomplete { .. } => true,
            Self::Io { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("rclone executable not found: {0}")]
    ToolMissing(String),

    #[error("rclone remote '{remote}' is not configured (available: {})", available.join(", "))]
    RemoteNotConfigured {
        remote: String,
        available: Vec<String>,
    },

    #[error("rclone remote '{remote}' is unreachable: {detail}")]
    Unreachable { remote: String, detail: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("failed to run rclone: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("malformed rclone listing: {0}")]
    MalformedListing(String),
}

impl Retryable for TransferError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::Timeout { .. } | Self::Unreachable { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl Retryable for NotifyError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => transport_is_retryable(err),
            Self::Rejected { status, .. } => status_is_retryable(*status),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to remove staging folder {}: {source}", path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors that abort a run before any recording is processed.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Auth(AuthError),

    #[error(transparent)]
    NotFound(NotFoundError),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("environment check failed: {0}")]
    Environment(TransferError),
}

impl From<AuthError> for FatalError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<TransferError> for FatalError {
    fn from(err: TransferError) -> Self {
        Self::Environment(err)
    }
}

impl From<ProviderError> for FatalError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Auth(inner) => Self::Auth(inner),
            ProviderError::NotFound(inner) => Self::NotFound(inner),
            other => Self::Provider(other),
        }
    }
}
