//! Engine facade
//!
//! Owns the registry, the validated graph, the snapshot store and the run
//! lock. One `run_once` call is one run:
//!
//! 1. Validate the graph (first run only; freezes the registry)
//! 2. Take the run lock
//! 3. Load the previous snapshot (unreadable = degraded, not fatal)
//! 4. Evaluate every entity in topological order
//! 5. Unless the run is fatal, write the successor snapshot atomically

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use reflow_core::{Error, ResolveResult, Result, RunId, Value};
use reflow_durability::{FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotStore};
use tracing::{info, warn};

use crate::bindings::Bindings;
use crate::change::ChangeDetector;
use crate::config::EngineConfig;
use crate::context::ContextView;
use crate::entity::{Entity, EntityKind};
use crate::evaluator::Evaluator;
use crate::graph::DependencyGraph;
use crate::lock::RunLock;
use crate::predicate::Predicate;
use crate::registry::Registry;
use crate::report::{RunReport, RunStatus};

/// Dependency-evaluation engine
pub struct Engine {
    registry: RwLock<Registry>,
    graph: OnceCell<DependencyGraph>,
    store: Box<dyn SnapshotStore>,
    config: EngineConfig,
    lock: RunLock,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store.location())
            .field("config", &self.config)
            .field("validated", &self.graph.get().is_some())
            .finish()
    }
}

fn persistence(e: reflow_durability::DurabilityError) -> Error {
    Error::Persistence(e.to_string())
}

impl Engine {
    /// Open an engine with `config`
    ///
    /// Snapshots go to `<state_dir>/<snapshot_file>` when `state_dir` is
    /// set, otherwise they live in memory for the lifetime of the engine.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store: Box<dyn SnapshotStore> = match &config.state_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Box::new(
                    FileSnapshotStore::open(dir.clone(), config.snapshot_file.clone())
                        .map_err(persistence)?,
                )
            }
            None => Box::new(MemorySnapshotStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    /// Open an engine whose configuration lives in `dir/reflow.toml`
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(EngineConfig::load_or_create(dir.as_ref())?)
    }

    /// Engine with in-memory snapshots and default settings
    pub fn ephemeral() -> Self {
        Self::with_store(EngineConfig::in_memory(), Box::new(MemorySnapshotStore::new()))
    }

    /// Engine over a caller-supplied snapshot store
    pub fn with_store(config: EngineConfig, store: Box<dyn SnapshotStore>) -> Self {
        let lock = RunLock::new(config.lock_path());
        Engine {
            registry: RwLock::new(Registry::new()),
            graph: OnceCell::new(),
            store,
            config,
            lock,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an entity
    ///
    /// # Errors
    ///
    /// `RegistryFrozen` after the first run, `DuplicateName`, or
    /// `InvalidDeclaration`.
    pub fn register(&self, entity: Entity) -> Result<()> {
        if self.graph.get().is_some() {
            return Err(Error::RegistryFrozen(entity.name().to_string()));
        }
        self.registry.write().register(entity)
    }

    /// Register a non-persistent Variable with a fixed value
    pub fn register_variable(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.register(Entity::variable(name, value))
    }

    /// Register a non-persistent Function
    pub fn register_function<I, S, F>(&self, name: &str, dependencies: I, f: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&ContextView<'_>) -> ResolveResult<Value> + Send + Sync + 'static,
    {
        self.register(Entity::function(name, dependencies, f))
    }

    /// Register a non-persistent Action
    pub fn register_action<I, S, F>(&self, name: &str, dependencies: I, f: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&ContextView<'_>) -> ResolveResult<()> + Send + Sync + 'static,
    {
        self.register(Entity::action(name, dependencies, f))
    }

    /// Register a predicate
    pub fn register_predicate(&self, predicate: Predicate) -> Result<()> {
        if self.graph.get().is_some() {
            return Err(Error::RegistryFrozen(predicate.name().to_string()));
        }
        self.registry.write().register_predicate(predicate)
    }

    // ========================================================================
    // Graph
    // ========================================================================

    /// Build and check the dependency graph
    ///
    /// Runs implicitly on the first `run_once`. On success the registry is
    /// frozen; on a structural error it stays open so declarations can be
    /// fixed.
    pub fn validate(&self) -> Result<&DependencyGraph> {
        self.graph.get_or_try_init(|| {
            let mut registry = self.registry.write();
            let graph = DependencyGraph::build(&registry)?;
            registry.freeze();
            Ok(graph)
        })
    }

    /// Entity names in evaluation order
    pub fn topological_order(&self) -> Result<Vec<String>> {
        Ok(self
            .validate()?
            .topological_order()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Names of the registered entities, in declaration order
    pub fn entity_names(&self) -> Vec<String> {
        self.registry
            .read()
            .all_entities()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Snapshot committed by the last successful run
    pub fn last_snapshot(&self) -> Result<Option<Snapshot>> {
        self.store.load().map_err(persistence)
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Execute one run
    ///
    /// # Errors
    ///
    /// Structural graph errors, `UnknownBinding`, and `RunInProgress` are
    /// returned as `Err`. Everything that happens inside the run, including
    /// fatal upstream failures, is reported in the [`RunReport`].
    pub fn run_once(&self, bindings: Bindings) -> Result<RunReport> {
        let graph = self.validate()?;
        let _guard = self.lock.acquire()?;
        let registry = self.registry.read();

        for name in bindings.names() {
            match registry.find_entity(name) {
                Some(entity) if entity.kind() == EntityKind::Variable => {}
                _ => return Err(Error::UnknownBinding(name.to_string())),
            }
        }

        let run_id = RunId::new();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            target: "reflow::engine",
            run_id = %run_id,
            entities = graph.len(),
            parallel = self.config.parallel,
            "Run started"
        );

        let mut warnings = Vec::new();
        let detector = match self.store.load() {
            Ok(Some(snapshot)) => ChangeDetector::new(snapshot),
            Ok(None) => ChangeDetector::new(Snapshot::empty()),
            Err(e) => {
                warn!(
                    target: "reflow::engine",
                    location = %self.store.location(),
                    error = %e,
                    "Snapshot unreadable, treating every entity as changed"
                );
                warnings.push(format!(
                    "snapshot at {} unreadable, treated as first run: {}",
                    self.store.location(),
                    e
                ));
                ChangeDetector::degraded()
            }
        };

        let evaluation = Evaluator::new(&registry, graph)
            .with_unresolved(self.config.unresolved.clone())
            .with_parallel(self.config.parallel)
            .run(bindings, detector)?;
        warnings.extend(evaluation.warnings);

        let mut persisted = false;
        let mut generation = None;
        if evaluation.status == RunStatus::Fatal {
            warn!(target: "reflow::engine", run_id = %run_id, "Fatal run, snapshot not written");
        } else {
            let snapshot = evaluation
                .detector
                .into_snapshot(|name| registry.is_persistent(name));
            match self.store.save(&snapshot) {
                Ok(()) => {
                    persisted = true;
                    generation = Some(snapshot.generation());
                    info!(
                        target: "reflow::engine",
                        run_id = %run_id,
                        generation = snapshot.generation(),
                        entries = snapshot.len(),
                        "Snapshot committed"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "reflow::engine",
                        location = %self.store.location(),
                        error = %e,
                        "Snapshot write failed"
                    );
                    warnings.push(format!(
                        "snapshot at {} not written: {}",
                        self.store.location(),
                        e
                    ));
                }
            }
        }

        let duration = started.elapsed();
        info!(
            target: "reflow::engine",
            run_id = %run_id,
            status = %evaluation.status,
            duration_us = duration.as_micros() as u64,
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            status: evaluation.status,
            entities: evaluation.entities,
            warnings,
            fatal: evaluation.fatal,
            started_at,
            duration,
            persisted,
            generation,
        })
    }
}
