//! Evaluation engine for Reflow
//!
//! This crate turns a set of declared entities into one deterministic pass
//! per run:
//! - Registry: Variables, Functions, Actions and Predicates by name
//! - Graph: DAG validation, topological order, waves
//! - Context: write-once Value Store with lazy values and scoped reads
//! - Change detection against the previous run's snapshot
//! - Evaluator: predicates, firing eligibility, failure propagation
//! - Engine: configuration, run lock, snapshot persistence, run reports
//!
//! The engine is the only component that writes snapshots. Resolvers see a
//! read-only [`ContextView`] limited to their declared dependencies.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bindings;
pub mod change;
pub mod config;
pub mod context;
pub mod engine;
pub mod entity;
pub mod evaluator;
pub mod firing;
pub mod graph;
pub mod lock;
pub mod predicate;
pub mod registry;
pub mod report;

pub use bindings::Bindings;
pub use change::ChangeDetector;
pub use config::{EngineConfig, CONFIG_FILE_NAME, DEFAULT_SNAPSHOT_FILE};
pub use context::{ContextView, Deferred, Thunk, ValueStore};
pub use engine::Engine;
pub use entity::{ActionResolver, Entity, EntityKind, Resolver, VariableSource};
pub use evaluator::{Evaluation, Evaluator};
pub use firing::{ChangeSet, FiringFn, FiringPolicy};
pub use graph::DependencyGraph;
pub use lock::{RunGuard, RunLock};
pub use predicate::{Check, CompareOp, Predicate, Scale};
pub use registry::Registry;
pub use report::{EntityReport, Outcome, RunReport, RunStatus};
