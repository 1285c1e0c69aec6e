//! Snapshot stores
//!
//! The engine persists through the [`SnapshotStore`] trait so the storage
//! medium stays an external concern. Two implementations are provided:
//!
//! - [`FileSnapshotStore`]: one snapshot file in a state directory
//! - [`MemorySnapshotStore`]: process-local, for tests and ephemeral engines

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::DurabilityResult;
use crate::reader::SnapshotReader;
use crate::snapshot::Snapshot;
use crate::writer::SnapshotWriter;

/// Durable home of the run-to-run snapshot
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed snapshot, `None` if nothing was ever committed
    fn load(&self) -> DurabilityResult<Option<Snapshot>>;

    /// Atomically replace the stored snapshot
    fn save(&self, snapshot: &Snapshot) -> DurabilityResult<()>;

    /// Human-readable location, used in log events
    fn location(&self) -> String;
}

/// Snapshot store backed by a single file
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    writer: SnapshotWriter,
    reader: SnapshotReader,
}

impl FileSnapshotStore {
    /// Open a store for `<dir>/<file_name>`
    ///
    /// Creates the directory and removes a temporary file left by a crashed
    /// writer.
    pub fn open(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> DurabilityResult<Self> {
        let writer = SnapshotWriter::new(dir.into(), file_name)?;
        if writer.cleanup_temp_file()? {
            warn!(
                target: "reflow::durability",
                path = %writer.path().display(),
                "Removed incomplete snapshot left by an interrupted run"
            );
        }
        Ok(FileSnapshotStore {
            writer,
            reader: SnapshotReader::new(),
        })
    }

    /// Path of the snapshot file
    pub fn path(&self) -> PathBuf {
        self.writer.path()
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> DurabilityResult<Option<Snapshot>> {
        self.reader.load(&self.writer.path())
    }

    fn save(&self, snapshot: &Snapshot) -> DurabilityResult<()> {
        self.writer.write(snapshot).map(|_| ())
    }

    fn location(&self) -> String {
        self.writer.path().display().to_string()
    }
}

/// In-memory snapshot store
///
/// Cloning shares the underlying slot, so a test can keep a handle and
/// inspect what the engine committed.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<Snapshot>>>,
}

impl MemorySnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        MemorySnapshotStore::default()
    }

    /// Current contents
    pub fn current(&self) -> Option<Snapshot> {
        self.slot.lock().clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> DurabilityResult<Option<Snapshot>> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, snapshot: &Snapshot) -> DurabilityResult<()> {
        *self.slot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
