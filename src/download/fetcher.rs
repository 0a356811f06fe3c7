//! How bytes get from a download URL onto disk.
//!
//! The pipeline picks one [`Fetcher`] when it is built: [`HttpFetcher`] for
//! live runs and [`DryRunFetcher`] when nothing may be written.

use async_trait::async_trait;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::auth::TokenSource;
use crate::error::FileDownloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    Written { bytes: u64 },
    /// A verified copy was already staged by an earlier run.
    AlreadyPresent { bytes: u64 },
    /// Nothing was fetched or written.
    DryRun,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Make sure `dir` exists. Safe to call repeatedly.
    async fn prepare(&self, dir: &Path) -> Result<(), FileDownloadError>;

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_size: Option<u64>,
        progress: &ProgressBar,
    ) -> Result<Fetched, FileDownloadError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpFetcher {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
        }
    }

    async fn write_body(
        &self,
        mut response: reqwest::Response,
        partial: &Path,
        progress: &ProgressBar,
    ) -> Result<u64, FileDownloadError> {
        let io_err = |source| FileDownloadError::Io {
            path: partial.to_path_buf(),
            source,
        };

        let mut file = fs::File::create(partial).await.map_err(io_err)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        Ok(written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn prepare(&self, dir: &Path) -> Result<(), FileDownloadError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| FileDownloadError::Io {
                path: dir.to_path_buf(),
                source,
            })
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_size: Option<u64>,
        progress: &ProgressBar,
    ) -> Result<Fetched, FileDownloadError> {
        if let (Some(expected), Ok(meta)) = (expected_size, fs::metadata(dest).await) {
            if meta.is_file() && meta.len() == expected {
                debug!("{} already staged, skipping download", dest.display());
                return Ok(Fetched::AlreadyPresent { bytes: expected });
            }
        }

        let credential = self.tokens.get_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FileDownloadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let expected = expected_size.or_else(|| response.content_length());
        if let Some(total) = expected {
            progress.set_length(total);
        }

        let partial = partial_path(dest);
        let result = match self.write_body(response, &partial, progress).await {
            Ok(bytes) => match expected {
                Some(expected) if expected != bytes => Err(FileDownloadError::Incomplete {
                    expected,
                    actual: bytes,
                }),
                _ => Ok(bytes),
            },
            Err(err) => Err(err),
        };

        match result {
            Ok(bytes) => {
                fs::rename(&partial, dest)
                    .await
                    .map_err(|source| FileDownloadError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                Ok(Fetched::Written { bytes })
            }
            Err(err) => {
                let _ = fs::remove_file(&partial).await;
                Err(err)
            }
        }
    }
}

/// Touches neither the network nor the filesystem.
pub struct DryRunFetcher;

#[async_trait]
impl Fetcher for DryRunFetcher {
    async fn prepare(&self, _dir: &Path) -> Result<(), FileDownloadError> {
        Ok(())
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        _expected_size: Option<u64>,
        _progress: &ProgressBar,
    ) -> Result<Fetched, FileDownloadError> {
        debug!("[dry-run] would fetch {} -> {}", url, dest.display());
        Ok(Fetched::DryRun)
    }
}

/// `name.mp4` -> `name.mp4.part`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
