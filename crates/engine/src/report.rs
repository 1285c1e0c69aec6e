//! Run reports
//!
//! Every `run_once` returns a [`RunReport`] listing each entity's outcome,
//! its value or error, and timing, together with a terminal [`RunStatus`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reflow_core::{Error, RunId, Value};
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every entity resolved or was intentionally skipped
    Success,
    /// Some entities failed, the run still completed
    PartialFailure,
    /// An upstream chain failed without fallback, or the run was aborted
    Fatal,
}

impl RunStatus {
    /// Conventional process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::PartialFailure => 1,
            RunStatus::Fatal => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial-failure",
            RunStatus::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// What happened to one entity in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Variable resolved to a value
    Resolved,
    /// Variable left deferred; nothing read it
    Deferred,
    /// Resolver ran
    Fired,
    /// Nothing changed; the previous value was reused
    Reused,
    /// Action not eligible; nothing ran
    Skipped,
    /// A predicate was false or failed
    Suppressed,
    /// Resolver requested abort (of the entity or the run)
    Aborted,
    /// Resolver failed
    Failed,
    /// A dependency had no value
    UpstreamFailed,
    /// The run ended before this entity was reached
    NotEvaluated,
}

impl Outcome {
    /// True if this outcome counts as a failure for the run status
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::UpstreamFailed)
    }
}

/// Outcome of one entity
#[derive(Debug)]
pub struct EntityReport {
    /// Entity name
    pub name: String,
    /// Entity kind
    pub kind: EntityKind,
    /// Outcome
    pub outcome: Outcome,
    /// Value visible in the Value Store after this entity, if any
    pub value: Option<Value>,
    /// Failure, or the predicate error that suppressed the entity
    pub error: Option<Error>,
    /// Time spent deciding and resolving
    pub elapsed: Duration,
}

impl EntityReport {
    pub(crate) fn new(name: &str, kind: EntityKind, outcome: Outcome) -> Self {
        EntityReport {
            name: name.to_string(),
            kind,
            outcome,
            value: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    pub(crate) fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    pub(crate) fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// True if the resolver ran
    pub fn fired(&self) -> bool {
        self.outcome == Outcome::Fired
    }
}

/// Result of one run
#[derive(Debug)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Terminal status
    pub status: RunStatus,
    /// One entry per registered entity, in evaluation order
    pub entities: Vec<EntityReport>,
    /// Non-fatal problems: predicate failures, unreadable or unwritable snapshots
    pub warnings: Vec<String>,
    /// Error that made the run fatal
    pub fatal: Option<Error>,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Total duration
    pub duration: Duration,
    /// True if a snapshot was written
    pub persisted: bool,
    /// Generation of the snapshot written by this run
    pub generation: Option<u64>,
}

impl RunReport {
    /// Report for `name`
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        let name = reflow_core::normalize_name(name);
        self.entities.iter().find(|e| e.name == name)
    }

    /// Outcome for `name`
    pub fn outcome(&self, name: &str) -> Option<Outcome> {
        self.entity(name).map(|e| e.outcome)
    }

    /// True if `name` fired
    pub fn fired(&self, name: &str) -> bool {
        self.entity(name).map_or(false, EntityReport::fired)
    }

    /// Value of `name` after the run
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entity(name)?.value.as_ref()
    }

    /// Names of the entities that fired, in evaluation order
    pub fn fired_names(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| e.fired())
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Failure chain of a fatal upstream failure, empty otherwise
    pub fn fatal_chain(&self) -> &[String] {
        match &self.fatal {
            Some(error) => error.chain(),
            None => &[],
        }
    }

    /// True for [`RunStatus::Success`]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Conventional process exit code
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Machine-readable summary
    pub fn to_json(&self) -> serde_json::Value {
        let entities: Vec<serde_json::Value> = self
            .entities
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "kind": e.kind,
                    "outcome": e.outcome,
                    "value": e.value.as_ref().map(Value::to_json),
                    "error": e.error.as_ref().map(|err| err.to_string()),
                    "elapsed_us": e.elapsed.as_micros() as u64,
                })
            })
            .collect();
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "status": self.status,
            "started_at": self.started_at,
            "duration_us": self.duration.as_micros() as u64,
            "persisted": self.persisted,
            "generation": self.generation,
            "warnings": self.warnings,
            "fatal": self.fatal.as_ref().map(|err| err.to_string()),
            "entities": entities,
        })
    }
}
