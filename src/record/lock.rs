use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to open lock file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited:?} acquiring lock '{path}'; another process may be using this working directory")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("Failed to lock '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive advisory lock on the backend record.
///
/// The lock lives in a sibling `.lock` file so the record itself can be
/// replaced by rename while held. It is released when the guard drops.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock for `record_path`, retrying until `timeout` elapses.
    /// A zero timeout makes a single attempt.
    pub fn acquire(record_path: &Path, timeout: Duration, reason: &str) -> Result<Self, LockError> {
        let path = record_path.with_extension("lock");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let contended = fs2::lock_contended_error();
        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if e.raw_os_error() == contended.raw_os_error() => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LockError::Timeout { path, waited });
                    }
                    tracing::debug!(path = %path.display(), "Lock held elsewhere, retrying");
                    thread::sleep(RETRY_INTERVAL.min(timeout - waited));
                }
                Err(source) => return Err(LockError::Io { path, source }),
            }
        }

        tracing::debug!(path = %path.display(), reason, "Acquired state lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release state lock");
        } else {
            tracing::debug!(path = %self.path.display(), "Released state lock");
        }
    }
}
