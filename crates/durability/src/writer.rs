//! Crash-safe snapshot writer
//!
//! Uses write-fsync-rename pattern for atomic snapshot replacement.
//!
//! # Crash Safety
//!
//! The snapshot write follows this pattern:
//! 1. Write to temporary file (.<name>.tmp)
//! 2. fsync the temporary file
//! 3. Atomic rename over the final path
//! 4. fsync the parent directory
//!
//! Either the complete new snapshot is visible or the previous one is; a
//! partially written snapshot is never observed by the next run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DurabilityResult;
use crate::snapshot::Snapshot;

/// Snapshot writer with crash-safe semantics
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    file_name: String,
}

impl SnapshotWriter {
    /// Create a new snapshot writer
    ///
    /// Creates the state directory if it doesn't exist.
    pub fn new(dir: PathBuf, file_name: impl Into<String>) -> DurabilityResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(SnapshotWriter {
            dir,
            file_name: file_name.into(),
        })
    }

    /// Get the state directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the snapshot file
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.tmp", self.file_name))
    }

    /// Write a snapshot using the crash-safe pattern
    ///
    /// Returns snapshot info on success.
    pub fn write(&self, snapshot: &Snapshot) -> DurabilityResult<SnapshotInfo> {
        let bytes = snapshot.encode()?;
        let final_path = self.path();
        let temp_path = self.temp_path();

        // Step 1: Write to temporary file. A leftover temp from a crashed
        // writer is truncated rather than trusted.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(&bytes)?;

        // Step 2: fsync the file
        file.sync_all()?;
        drop(file);

        // Step 3: Atomic rename
        std::fs::rename(&temp_path, &final_path)?;

        // Step 4: fsync parent directory
        sync_dir(&self.dir)?;

        debug!(
            target: "reflow::durability",
            path = %final_path.display(),
            generation = snapshot.generation(),
            entries = snapshot.len(),
            bytes = bytes.len(),
            "Snapshot written"
        );

        Ok(SnapshotInfo {
            generation: snapshot.generation(),
            entries: snapshot.len(),
            bytes: bytes.len(),
            path: final_path,
        })
    }

    /// Remove a temporary file left behind by a crash
    ///
    /// Returns true if a file was removed.
    pub fn cleanup_temp_file(&self) -> DurabilityResult<bool> {
        let temp_path = self.temp_path();
        if temp_path.exists() {
            std::fs::remove_file(temp_path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Check if a temporary file exists
    pub fn temp_file_exists(&self) -> bool {
        self.temp_path().exists()
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directories cannot be opened for fsync on Windows.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Information about a written snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// Snapshot generation
    pub generation: u64,
    /// Number of entries written
    pub entries: usize,
    /// Size of the file in bytes
    pub bytes: usize,
    /// Path to the snapshot file
    pub path: PathBuf,
}
