//! Durability layer for Reflow
//!
//! This crate handles everything that touches disk:
//!
//! - Snapshot format: header, MessagePack body, CRC32 footer
//! - Crash-safe snapshot writes (write, fsync, rename, fsync dir)
//! - Validating snapshot reads
//! - The `SnapshotStore` abstraction the engine persists through, with a
//!   file-backed and an in-memory implementation
//!
//! The snapshot is the only state that survives between runs. A missing or
//! corrupt snapshot is reported as an error here; the engine decides to
//! degrade to "no prior snapshot".

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod reader;
pub mod snapshot;
pub mod store;
pub mod writer;

pub use error::{DurabilityError, DurabilityResult};
pub use format::{
    now_micros, SnapshotHeader, SNAPSHOT_FOOTER_SIZE, SNAPSHOT_FORMAT_VERSION,
    SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC,
};
pub use reader::SnapshotReader;
pub use snapshot::{InputRecord, Snapshot};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use writer::{SnapshotInfo, SnapshotWriter};
