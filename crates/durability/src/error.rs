//! Durability errors

use std::io;
use thiserror::Error;

/// Result type alias for durability operations
pub type DurabilityResult<T> = std::result::Result<T, DurabilityError>;

/// Errors that can occur when reading or writing snapshots
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File is too small to hold a header and footer
    #[error("Snapshot file too small: {size} bytes")]
    FileTooSmall {
        /// Actual file size
        size: usize,
    },

    /// Invalid magic bytes
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes
        expected: [u8; 8],
        /// Actual magic bytes
        actual: [u8; 8],
    },

    /// Format version this build cannot read
    #[error("Unsupported snapshot format version: {0}")]
    UnsupportedVersion(u32),

    /// Footer checksum does not match the contents
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// CRC stored in the footer
        stored: u32,
        /// CRC computed over the file
        computed: u32,
    },

    /// Body length in the header disagrees with the file
    #[error("Snapshot body truncated: expected {expected} bytes, found {available}")]
    Truncated {
        /// Body length recorded in the header
        expected: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Entry count in the header disagrees with the decoded body
    #[error("Entry count mismatch: header says {header}, body has {body}")]
    EntryCountMismatch {
        /// Count recorded in the header
        header: u32,
        /// Count decoded from the body
        body: usize,
    },

    /// Body could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl DurabilityError {
    /// Check if this error indicates damaged snapshot contents
    ///
    /// Corruption (as opposed to an I/O failure) means the file exists but
    /// cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, DurabilityError::Io(_) | DurabilityError::Encode(_))
    }
}

impl From<rmp_serde::encode::Error> for DurabilityError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        DurabilityError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for DurabilityError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        DurabilityError::Decode(e.to_string())
    }
}
