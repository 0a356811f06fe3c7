use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = ".zoom-drive-sync.lock";

/// Exclusive claim on a download root, held for the length of a live run.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Fails immediately if another run holds the lock.
    pub async fn acquire(root: &Path) -> io::Result<Self> {
        let path = root.join(LOCK_FILE);
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.try_lock_exclusive().map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("another run is using {}: {}", path.display(), err),
                )
            })?;
            Ok(RunLock { file, path })
        })
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            debug!("Failed to release run lock {}: {err:?}", self.path.display());
        }
    }
}
