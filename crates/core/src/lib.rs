//! Core types for Reflow
//!
//! This crate defines the foundational types shared by every layer:
//! - Value: Structural value stored in the context and in snapshots
//! - Name helpers: Normalization and sub-addressing of entity names
//! - RunId: Unique identifier for a single evaluation run
//! - Error / ResolveError: Error hierarchy for the engine and for resolvers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod name;
pub mod types;
pub mod value;

pub use error::{Error, ResolveError, ResolveResult, Result};
pub use name::{normalize_name, Address, ADDRESS_SEPARATOR};
pub use types::RunId;
pub use value::Value;
