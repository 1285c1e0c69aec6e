//! Snapshot file format
//!
//! ## Snapshot File Layout
//!
//! ```text
//! +------------------+
//! | Magic (8 bytes)  |  "REFLOWSN"
//! +------------------+
//! | Version (4)      |  Format version (1)
//! +------------------+
//! | Generation (8)   |  Monotonic snapshot generation
//! +------------------+
//! | Timestamp (8)    |  Microseconds since epoch
//! +------------------+
//! | Entry count (4)  |  Number of persisted entities
//! +------------------+
//! | Body length (8)  |  Length of the MessagePack body
//! +------------------+
//! | Body             |  MessagePack: values (name -> Value) and
//! |                  |  input records (consumer -> name -> Value)
//! +------------------+
//! | CRC32 (4)        |  Checksum of everything above
//! +------------------+
//! ```
//!
//! All integers are little-endian.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{DurabilityError, DurabilityResult};

/// Snapshot file magic bytes
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"REFLOWSN";

/// Current snapshot format version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Header size: Magic(8) + Version(4) + Generation(8) + Timestamp(8) + Count(4) + BodyLen(8)
pub const SNAPSHOT_HEADER_SIZE: usize = 40;

/// Footer size: CRC32
pub const SNAPSHOT_FOOTER_SIZE: usize = 4;

/// Fixed-size snapshot header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes
    pub magic: [u8; 8],
    /// Format version
    pub version: u32,
    /// Snapshot generation (incremented on every committed run)
    pub generation: u64,
    /// When the snapshot was written (microseconds since epoch)
    pub created_at: u64,
    /// Number of entries in the body
    pub entry_count: u32,
    /// Length of the body in bytes
    pub body_len: u64,
}

impl SnapshotHeader {
    /// Create a header for the current format version
    pub fn new(generation: u64, created_at: u64, entry_count: u32, body_len: u64) -> Self {
        SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_FORMAT_VERSION,
            generation,
            created_at,
            entry_count,
            body_len,
        }
    }

    /// Serialize header to bytes (including magic)
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_HEADER_SIZE] {
        let mut buf = [0u8; SNAPSHOT_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.magic);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..20].copy_from_slice(&self.generation.to_le_bytes());
        buf[20..28].copy_from_slice(&self.created_at.to_le_bytes());
        buf[28..32].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[32..40].copy_from_slice(&self.body_len.to_le_bytes());
        buf
    }

    /// Parse header from bytes
    ///
    /// Validates magic and version; length checks are the caller's concern.
    pub fn from_bytes(data: &[u8; SNAPSHOT_HEADER_SIZE]) -> DurabilityResult<Self> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[0..8]);
        if magic != SNAPSHOT_MAGIC {
            return Err(DurabilityError::InvalidMagic {
                expected: SNAPSHOT_MAGIC,
                actual: magic,
            });
        }

        let version = u32::from_le_bytes(le_array(&data[8..12]));
        if version != SNAPSHOT_FORMAT_VERSION {
            return Err(DurabilityError::UnsupportedVersion(version));
        }

        Ok(SnapshotHeader {
            magic,
            version,
            generation: u64::from_le_bytes(le_array(&data[12..20])),
            created_at: u64::from_le_bytes(le_array(&data[20..28])),
            entry_count: u32::from_le_bytes(le_array(&data[28..32])),
            body_len: u64::from_le_bytes(le_array(&data[32..40])),
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
