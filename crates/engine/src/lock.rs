//! Run lock
//!
//! At most one run per engine at a time. The in-process mutex serializes
//! runs on the same [`Engine`](crate::Engine); the optional lock file
//! excludes other processes sharing the state directory. Both are released
//! when the [`RunGuard`] drops, on every exit path.

use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use reflow_core::{Error, Result};
use tracing::debug;

/// Exclusive run lock
#[derive(Debug)]
pub struct RunLock {
    // Using parking_lot::Mutex so a panicking run does not poison the lock
    mutex: Mutex<()>,
    path: Option<PathBuf>,
}

/// Held for the duration of one run
#[must_use = "the run lock is released when the guard drops"]
pub struct RunGuard<'a> {
    _local: MutexGuard<'a, ()>,
    file: Option<File>,
}

impl RunLock {
    /// Lock with an optional cross-process lock file
    pub fn new(path: Option<PathBuf>) -> Self {
        RunLock {
            mutex: Mutex::new(()),
            path,
        }
    }

    /// Lock file path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the lock
    ///
    /// Waits for a concurrent run in this process. Fails immediately with
    /// [`Error::RunInProgress`] if another process holds the lock file.
    pub fn acquire(&self) -> Result<RunGuard<'_>> {
        let local = self.mutex.lock();
        let file = match &self.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .read(true)
                    .write(true)
                    .open(path)?;
                fs2::FileExt::try_lock_exclusive(&file)
                    .map_err(|_| Error::RunInProgress(path.display().to_string()))?;
                debug!(target: "reflow::engine", path = %path.display(), "Run lock acquired");
                Some(file)
            }
            None => None,
        };
        Ok(RunGuard {
            _local: local,
            file,
        })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}
