//! Reflow - change-aware declarative dependency evaluation
//!
//! Declare Variables, Functions, Actions and Predicates by name; Reflow
//! orders them into a DAG, evaluates each run in one deterministic pass,
//! and fires a persistent entity only when one of its inputs changed since
//! the previous run.
//!
//! # Quick Start
//!
//! ```ignore
//! use reflow::{Bindings, Engine, EngineConfig, Entity, Value};
//!
//! let engine = Engine::open(EngineConfig::at("/var/lib/myapp"))?;
//! engine.register(Entity::external("config").persistent(true))?;
//! engine.register(Entity::variable("mysql", "db:3306").persistent(true))?;
//! engine.register(
//!     Entity::function("apache", ["mysql", "config:https"], |ctx| {
//!         let https = ctx.get_bool("config:https")?;
//!         Ok(Value::from(format!("{}{}", https, ctx.get_str("mysql")?)))
//!     })
//!     .persistent(true),
//! )?;
//!
//! let mut bindings = Bindings::new();
//! bindings.insert_json("config", serde_json::json!({"https": true}));
//! let report = engine.run_once(bindings)?;
//! assert!(report.fired("apache"));
//! ```
//!
//! # Architecture
//!
//! - `reflow-core`: values, names, errors
//! - `reflow-durability`: snapshot format and stores
//! - `reflow-engine`: registry, graph, evaluator, engine facade

pub use reflow_core::{
    normalize_name, Address, Error, ResolveError, ResolveResult, Result, RunId, Value,
};
pub use reflow_durability::{
    DurabilityError, FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotStore,
};
pub use reflow_engine::*;
