//! Persisted snapshot of entity values
//!
//! A snapshot maps entity names to the value each persistent entity had at
//! the end of the last committed run. It is read once at run start and
//! written at most once at run end.
//!
//! Next to the values it keeps, per persistent consumer, the dependency
//! values that consumer last fired with. Change detection compares against
//! those records, so a consumer that did not fire keeps its change pending.

use std::collections::BTreeMap;

use reflow_core::Value;
use serde::{Deserialize, Serialize};

use crate::error::{DurabilityError, DurabilityResult};
use crate::format::{now_micros, SnapshotHeader, SNAPSHOT_FOOTER_SIZE, SNAPSHOT_HEADER_SIZE};

/// Dependency values a consumer fired with, keyed by dependency name
pub type InputRecord = BTreeMap<String, Value>;

/// Last committed values of persistent entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    generation: u64,
    created_at: u64,
    values: BTreeMap<String, Value>,
    inputs: BTreeMap<String, InputRecord>,
}

#[derive(Serialize)]
struct BodyRef<'a> {
    values: &'a BTreeMap<String, Value>,
    inputs: &'a BTreeMap<String, InputRecord>,
}

#[derive(Deserialize)]
struct Body {
    values: BTreeMap<String, Value>,
    #[serde(default)]
    inputs: BTreeMap<String, InputRecord>,
}

impl Snapshot {
    /// Create an empty snapshot (generation 0, never committed)
    pub fn empty() -> Self {
        Snapshot::default()
    }

    /// Create a snapshot from values at a given generation
    pub fn with_values(generation: u64, values: BTreeMap<String, Value>) -> Self {
        Snapshot {
            generation,
            created_at: now_micros(),
            values,
            inputs: BTreeMap::new(),
        }
    }

    /// Attach the input record `consumer` fired with
    pub fn with_inputs(mut self, consumer: impl Into<String>, record: InputRecord) -> Self {
        self.inputs.insert(consumer.into(), record);
        self
    }

    /// Generation of this snapshot (0 = never committed)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was created (microseconds since epoch)
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Value recorded for `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check whether `name` has a recorded value
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of recorded entities
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Recorded names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// All recorded values
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Dependency values `consumer` last fired with
    pub fn inputs_of(&self, consumer: &str) -> Option<&InputRecord> {
        self.inputs.get(consumer)
    }

    /// Build the successor snapshot: this one overlaid with `updates` and
    /// `input_updates`
    ///
    /// Entries rejected by `keep` are dropped, so names that are no longer
    /// persistent entities do not linger. An input record is replaced
    /// whole, never merged.
    pub fn successor<F>(
        &self,
        updates: BTreeMap<String, Value>,
        input_updates: BTreeMap<String, InputRecord>,
        keep: F,
    ) -> Snapshot
    where
        F: Fn(&str) -> bool,
    {
        let mut values: BTreeMap<String, Value> = self
            .values
            .iter()
            .filter(|(name, _)| keep(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        values.extend(updates);
        let mut inputs: BTreeMap<String, InputRecord> = self
            .inputs
            .iter()
            .filter(|(name, _)| keep(name))
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        inputs.extend(input_updates);
        Snapshot {
            inputs,
            ..Snapshot::with_values(self.generation + 1, values)
        }
    }

    /// Encode into the on-disk file image (header, body, CRC footer)
    pub fn encode(&self) -> DurabilityResult<Vec<u8>> {
        let body = rmp_serde::to_vec(&BodyRef {
            values: &self.values,
            inputs: &self.inputs,
        })?;
        let header = SnapshotHeader::new(
            self.generation,
            self.created_at,
            self.values.len() as u32,
            body.len() as u64,
        );

        let mut buf = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + body.len() + SNAPSHOT_FOOTER_SIZE);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&body);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(buf)
    }

    /// Decode and validate an on-disk file image
    pub fn decode(data: &[u8]) -> DurabilityResult<Snapshot> {
        if data.len() < SNAPSHOT_HEADER_SIZE + SNAPSHOT_FOOTER_SIZE {
            return Err(DurabilityError::FileTooSmall { size: data.len() });
        }

        let (contents, footer) = data.split_at(data.len() - SNAPSHOT_FOOTER_SIZE);
        let mut stored = [0u8; SNAPSHOT_FOOTER_SIZE];
        stored.copy_from_slice(footer);
        let stored = u32::from_le_bytes(stored);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(contents);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(DurabilityError::CrcMismatch { stored, computed });
        }

        let mut header_bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        header_bytes.copy_from_slice(&contents[..SNAPSHOT_HEADER_SIZE]);
        let header = SnapshotHeader::from_bytes(&header_bytes)?;

        let body = &contents[SNAPSHOT_HEADER_SIZE..];
        if body.len() as u64 != header.body_len {
            return Err(DurabilityError::Truncated {
                expected: header.body_len as usize,
                available: body.len(),
            });
        }

        let Body { values, inputs } = rmp_serde::from_slice(body)?;
        if values.len() != header.entry_count as usize {
            return Err(DurabilityError::EntryCountMismatch {
                header: header.entry_count,
                body: values.len(),
            });
        }

        Ok(Snapshot {
            generation: header.generation,
            created_at: header.created_at,
            values,
            inputs,
        })
    }
}
