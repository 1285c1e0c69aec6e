//! Change Detector
//!
//! Compares this run's values against the snapshot committed by the previous
//! run, and batches the commits of the current run. Nothing is written until
//! the run ends: [`ChangeDetector::into_snapshot`] folds the batch into the
//! successor snapshot, which the engine then saves atomically.
//!
//! A consumer's inputs are compared against the record of what it last
//! fired with, not against each dependency's latest snapshot. A consumer
//! that failed, aborted or was suppressed keeps its old record, so a change
//! it missed is still a change on the next run.

use std::collections::BTreeMap;

use reflow_core::Value;
use reflow_durability::{InputRecord, Snapshot};

/// Run-scoped change detection over the previous snapshot
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Snapshot,
    pending: BTreeMap<String, Value>,
    pending_inputs: BTreeMap<String, InputRecord>,
    degraded: bool,
}

impl ChangeDetector {
    /// Detector seeded from the previous run's snapshot
    pub fn new(previous: Snapshot) -> Self {
        ChangeDetector {
            previous,
            pending: BTreeMap::new(),
            pending_inputs: BTreeMap::new(),
            degraded: false,
        }
    }

    /// Detector for a run whose snapshot could not be read
    ///
    /// Behaves as if no snapshot existed, so every entity counts as changed.
    pub fn degraded() -> Self {
        ChangeDetector {
            degraded: true,
            ..ChangeDetector::default()
        }
    }

    /// True if the previous snapshot was unreadable
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Generation of the previous snapshot (0 if none)
    pub fn previous_generation(&self) -> u64 {
        self.previous.generation()
    }

    /// Value committed for `name` by the previous run
    pub fn previous_value(&self, name: &str) -> Option<&Value> {
        self.previous.get(name)
    }

    /// Check whether the previous run committed `name`
    pub fn has_snapshot(&self, name: &str) -> bool {
        self.previous.contains(name)
    }

    /// True if `value` differs from the previous snapshot of `name`
    ///
    /// Always true when there is no snapshot entry. Comparison is structural.
    pub fn has_changed(&self, name: &str, value: &Value) -> bool {
        match self.previous.get(name) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    /// True if `dep` moved since `consumer` last fired
    ///
    /// Compares against the input record `consumer` fired with. Without a
    /// record (older snapshots) it falls back to the snapshot of `dep`
    /// itself. A dependency missing from the record counts as changed.
    pub fn input_changed(&self, consumer: &str, dep: &str, value: &Value) -> bool {
        match self.previous.inputs_of(consumer) {
            Some(record) => record.get(dep).map_or(true, |previous| previous != value),
            None => self.has_changed(dep, value),
        }
    }

    /// Stage `value` for `name`; ignored unless `persistent`
    pub fn commit(&mut self, name: &str, value: Value, persistent: bool) {
        if persistent {
            self.pending.insert(name.to_string(), value);
        }
    }

    /// Stage the inputs `consumer` fired with; ignored unless `persistent`
    pub fn commit_inputs(&mut self, consumer: &str, record: InputRecord, persistent: bool) {
        if persistent {
            self.pending_inputs.insert(consumer.to_string(), record);
        }
    }

    /// Values staged so far
    pub fn pending(&self) -> &BTreeMap<String, Value> {
        &self.pending
    }

    /// Input records staged so far
    pub fn pending_inputs(&self) -> &BTreeMap<String, InputRecord> {
        &self.pending_inputs
    }

    /// Build the successor snapshot
    ///
    /// Previous entries rejected by `keep` are dropped; staged values
    /// overwrite the rest.
    pub fn into_snapshot<F>(self, keep: F) -> Snapshot
    where
        F: Fn(&str) -> bool,
    {
        self.previous
            .successor(self.pending, self.pending_inputs, keep)
    }
}
