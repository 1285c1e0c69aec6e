//! Snapshot reader
//!
//! Loads and validates the snapshot file at run start.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::DurabilityResult;
use crate::snapshot::Snapshot;

/// Snapshot reader
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotReader;

impl SnapshotReader {
    /// Create a new snapshot reader
    pub fn new() -> Self {
        SnapshotReader
    }

    /// Load a snapshot from file
    ///
    /// Returns `Ok(None)` if the file does not exist (first run). Validates
    /// magic bytes, format version, body length, entry count and CRC.
    pub fn load(&self, path: &Path) -> DurabilityResult<Option<Snapshot>> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Snapshot::decode(&data).map(Some)
    }
}
