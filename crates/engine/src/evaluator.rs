//! Evaluator
//!
//! One pass over the dependency graph per run. For each entity in
//! topological order:
//!
//! 1. Variables are inserted into the Value Store (deferred sources stay
//!    lazy until first read).
//! 2. Functions and Actions force their dependencies, check their
//!    predicates, decide eligibility from the change flags of their
//!    dependencies, and fire or reuse their previous value.
//!
//! Commits to the Change Detector are staged; the caller decides whether the
//! resulting snapshot is written.
//!
//! Change is measured per consumer: each dependency value is compared with
//! the value the consumer last fired with, so an entity that did not fire
//! still sees the change on a later run.
//!
//! In parallel mode the graph is walked wave by wave. The Functions of a
//! wave are decided concurrently against the store as it stood before the
//! wave; entities in one wave never depend on each other, so they cannot
//! observe each other's writes. Results are then applied in topological
//! order, and Actions are decided during that pass, one at a time. Once an
//! entity aborts the run, the rest of its wave is reported `NotEvaluated`:
//! no later Action runs, though a later Function's resolver may already
//! have run concurrently and its result is discarded.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use reflow_core::{Error, ResolveError, ResolveResult, Result, Value};
use reflow_durability::InputRecord;
use tracing::{debug, error, warn};

use crate::bindings::Bindings;
use crate::change::ChangeDetector;
use crate::entity::{Body, Entity, EntityKind, VariableSource};
use crate::firing::ChangeSet;
use crate::graph::DependencyGraph;
use crate::registry::Registry;
use crate::context::ValueStore;
use crate::report::{EntityReport, Outcome, RunStatus};

/// Result of evaluating one run, before persistence
#[derive(Debug)]
pub struct Evaluation {
    /// Terminal status
    pub status: RunStatus,
    /// Per-entity reports in topological order
    pub entities: Vec<EntityReport>,
    /// Non-fatal problems
    pub warnings: Vec<String>,
    /// Error that made the run fatal
    pub fatal: Option<Error>,
    /// Staged commits on top of the previous snapshot
    pub detector: ChangeDetector,
}

// Decision for a Function or Action, computed without mutating run state.
enum Step {
    Fired {
        value: Option<Value>,
        inputs: InputRecord,
    },
    Reused(Value),
    Skipped,
    Suppressed {
        predicate: String,
        error: Option<ResolveError>,
    },
    Aborted(String),
    Failed(ResolveError),
    Upstream(Vec<String>),
    AbortRun(ResolveError),
}

struct RunState {
    store: ValueStore,
    detector: ChangeDetector,
    // Entities left without a value, with the failure chain that caused it
    failed: HashMap<String, Vec<String>>,
    warnings: Vec<String>,
    fatal: Option<Error>,
    predicate_failures: usize,
    aborted: bool,
}

/// Single-pass scheduler over a validated graph
pub struct Evaluator<'a> {
    registry: &'a Registry,
    graph: &'a DependencyGraph,
    unresolved: Value,
    parallel: bool,
}

impl<'a> Evaluator<'a> {
    /// Evaluator over `registry`, which `graph` was built from
    pub fn new(registry: &'a Registry, graph: &'a DependencyGraph) -> Self {
        Evaluator {
            registry,
            graph,
            unresolved: Value::Null,
            parallel: false,
        }
    }

    /// Value inserted for a suppressed Function that has no previous value
    pub fn with_unresolved(mut self, unresolved: Value) -> Self {
        self.unresolved = unresolved;
        self
    }

    /// Decide independent entities of a wave concurrently
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluate one run
    ///
    /// Returns `Err` only for internal invariant violations; resolver
    /// failures are reported per entity in the [`Evaluation`].
    pub fn run(&self, mut bindings: Bindings, detector: ChangeDetector) -> Result<Evaluation> {
        let order = self.graph.topological_order();
        let mut reports: Vec<Option<EntityReport>> = Vec::new();
        reports.resize_with(order.len(), || None);

        let mut state = RunState {
            store: ValueStore::new(),
            detector,
            failed: HashMap::new(),
            warnings: Vec::new(),
            fatal: None,
            predicate_failures: 0,
            aborted: false,
        };

        if self.parallel {
            self.run_waves(&mut bindings, &mut state, &mut reports)?;
        } else {
            self.run_sequential(&mut bindings, &mut state, &mut reports)?;
        }

        let entities = self.finish(&order, &mut state, reports)?;
        let status = if state.fatal.is_some() {
            RunStatus::Fatal
        } else if state.predicate_failures > 0 || entities.iter().any(|e| e.outcome.is_failure()) {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        Ok(Evaluation {
            status,
            entities,
            warnings: state.warnings,
            fatal: state.fatal,
            detector: state.detector,
        })
    }

    fn run_sequential(
        &self,
        bindings: &mut Bindings,
        state: &mut RunState,
        reports: &mut [Option<EntityReport>],
    ) -> Result<()> {
        for (pos, name) in self.graph.topological_order().into_iter().enumerate() {
            let entity = self.registry.entity(name)?;
            if entity.kind() == EntityKind::Variable {
                reports[pos] = Some(self.bind_variable(entity, bindings.take(name), state)?);
                continue;
            }

            let started = Instant::now();
            let step = self.decide(entity, state);
            let report = self.apply(entity, step, state)?;
            reports[pos] = Some(report.with_elapsed(started.elapsed()));
            if state.aborted {
                break;
            }
        }
        Ok(())
    }

    fn run_waves(
        &self,
        bindings: &mut Bindings,
        state: &mut RunState,
        reports: &mut [Option<EntityReport>],
    ) -> Result<()> {
        for wave in self.graph.waves() {
            let mut pending: Vec<(usize, &Entity)> = Vec::new();
            for name in wave {
                let entity = self.registry.entity(name)?;
                let pos = self
                    .graph
                    .position(name)
                    .ok_or_else(|| Error::NotFound(name.to_string()))?;
                if entity.kind() == EntityKind::Variable {
                    reports[pos] = Some(self.bind_variable(entity, bindings.take(name), state)?);
                } else {
                    pending.push((pos, entity));
                }
            }

            // Actions are left for the ordered pass below
            let shared: &RunState = state;
            let decided: Vec<Option<(Step, Duration)>> = pending
                .par_iter()
                .map(|(_, entity)| {
                    (entity.kind() == EntityKind::Function).then(|| {
                        let started = Instant::now();
                        let step = self.decide(entity, shared);
                        (step, started.elapsed())
                    })
                })
                .collect();

            for ((pos, entity), decided) in pending.into_iter().zip(decided) {
                if state.aborted {
                    debug!(
                        target: "reflow::engine",
                        entity = entity.name(),
                        "Run aborted earlier in the wave, not applied"
                    );
                    continue;
                }
                let (step, elapsed) = match decided {
                    Some(decided) => decided,
                    None => {
                        let started = Instant::now();
                        let step = self.decide(entity, state);
                        (step, started.elapsed())
                    }
                };
                let report = self.apply(entity, step, state)?;
                reports[pos] = Some(report.with_elapsed(elapsed));
            }
            if state.aborted {
                break;
            }
        }
        Ok(())
    }

    fn bind_variable(
        &self,
        entity: &Entity,
        binding: Option<VariableSource>,
        state: &mut RunState,
    ) -> Result<EntityReport> {
        let name = entity.name();
        let source = match (binding, entity.body()) {
            (Some(bound), _) => bound,
            (None, Body::Variable(source)) => source.clone(),
            (None, _) => return Err(Error::NotFound(name.to_string())),
        };

        let report = match source {
            VariableSource::Value(value) => {
                state.store.insert(name, value.clone())?;
                EntityReport::new(name, EntityKind::Variable, Outcome::Resolved)
                    .with_value(Some(value))
            }
            VariableSource::Deferred(thunk) => {
                state.store.insert_deferred(name, thunk)?;
                EntityReport::new(name, EntityKind::Variable, Outcome::Deferred)
            }
            VariableSource::External => {
                let missing = name.to_string();
                state.store.insert_deferred(
                    name,
                    Arc::new(move || Err(ResolveError::Missing(missing.clone()))),
                )?;
                EntityReport::new(name, EntityKind::Variable, Outcome::Deferred)
            }
        };
        Ok(report)
    }

    fn decide(&self, entity: &Entity, state: &RunState) -> Step {
        let name = entity.name();

        let mut inputs: Vec<(&str, &Value)> = Vec::with_capacity(entity.dependency_names().len());
        for dep in entity.dependency_names() {
            if let Some(chain) = state.failed.get(dep) {
                let mut chain = chain.clone();
                chain.push(name.to_string());
                return Step::Upstream(chain);
            }
            match state.store.get(dep) {
                Ok(value) => inputs.push((dep.as_str(), value)),
                Err(e) if e.is_abort_run() => return Step::AbortRun(e),
                Err(_) => return Step::Upstream(vec![dep.clone(), name.to_string()]),
            }
        }

        for predicate_name in entity.predicates() {
            let Ok(predicate) = self.registry.predicate(predicate_name) else {
                return Step::Suppressed {
                    predicate: predicate_name.clone(),
                    error: Some(ResolveError::Missing(predicate_name.clone())),
                };
            };
            let view = state.store.view(predicate.name(), predicate.reads());
            match guarded(|| predicate.evaluate(&view)) {
                Ok(true) => {}
                Ok(false) => {
                    return Step::Suppressed {
                        predicate: predicate_name.clone(),
                        error: None,
                    }
                }
                Err(e) if e.is_abort_run() => return Step::AbortRun(e),
                Err(e) => {
                    return Step::Suppressed {
                        predicate: predicate_name.clone(),
                        error: Some(e),
                    }
                }
            }
        }

        if entity.is_persistent() && state.detector.has_snapshot(name) {
            let mut changes = ChangeSet::new();
            for (dep, value) in &inputs {
                let changed = !self.registry.is_persistent(dep)
                    || state.detector.input_changed(name, dep, value);
                changes.record(*dep, changed);
            }
            let fire = entity.firing().should_fire(&changes);
            debug!(
                target: "reflow::engine",
                entity = name,
                changed = ?changes.changed_names(),
                fire,
                "Change check"
            );
            if !fire {
                return match state.detector.previous_value(name) {
                    Some(previous) if entity.kind() == EntityKind::Function => {
                        Step::Reused(previous.clone())
                    }
                    _ => Step::Skipped,
                };
            }
        }

        // Only persistent inputs can ever compare as unchanged
        let fired_with: InputRecord = if entity.is_persistent() {
            inputs
                .iter()
                .filter(|(dep, _)| self.registry.is_persistent(dep))
                .map(|(dep, value)| (dep.to_string(), (*value).clone()))
                .collect::<BTreeMap<_, _>>()
        } else {
            InputRecord::new()
        };

        let view = state.store.view(name, entity.dependency_names());
        let result = match entity.body() {
            Body::Function(resolver) => guarded(|| resolver(&view)).map(Some),
            Body::Action(resolver) => guarded(|| resolver(&view)).map(|()| None),
            Body::Variable(_) => return Step::Skipped,
        };
        match result {
            Ok(value) => Step::Fired {
                value,
                inputs: fired_with,
            },
            Err(ResolveError::AbortEntity(reason)) => Step::Aborted(reason),
            Err(e) if e.is_abort_run() => Step::AbortRun(e),
            Err(e) => Step::Failed(e),
        }
    }

    fn apply(&self, entity: &Entity, step: Step, state: &mut RunState) -> Result<EntityReport> {
        let name = entity.name();
        let kind = entity.kind();
        let persistent = entity.is_persistent();

        let report = match step {
            Step::Fired {
                value: Some(value),
                inputs,
            } => {
                state.store.insert(name, value.clone())?;
                state.detector.commit(name, value.clone(), persistent);
                state.detector.commit_inputs(name, inputs, persistent);
                debug!(target: "reflow::engine", entity = name, "Fired");
                EntityReport::new(name, kind, Outcome::Fired).with_value(Some(value))
            }
            Step::Fired {
                value: None,
                inputs,
            } => {
                state.store.mark_ran(name)?;
                state.detector.commit(name, Value::Null, persistent);
                state.detector.commit_inputs(name, inputs, persistent);
                debug!(target: "reflow::engine", entity = name, "Action ran");
                EntityReport::new(name, kind, Outcome::Fired)
            }
            Step::Reused(value) => {
                state.store.insert(name, value.clone())?;
                debug!(target: "reflow::engine", entity = name, "Unchanged, reusing previous value");
                EntityReport::new(name, kind, Outcome::Reused).with_value(Some(value))
            }
            Step::Skipped => {
                debug!(target: "reflow::engine", entity = name, "Unchanged, skipped");
                EntityReport::new(name, kind, Outcome::Skipped)
            }
            Step::Suppressed { predicate, error } => {
                let value = self.hold_previous(entity, state)?;
                let report = EntityReport::new(name, kind, Outcome::Suppressed).with_value(value);
                match error {
                    None => {
                        debug!(
                            target: "reflow::engine",
                            entity = name,
                            predicate = %predicate,
                            "Suppressed by predicate"
                        );
                        report
                    }
                    Some(e) => {
                        warn!(
                            target: "reflow::engine",
                            entity = name,
                            predicate = %predicate,
                            error = %e,
                            "Predicate failed, entity not fired"
                        );
                        state.predicate_failures += 1;
                        state.warnings.push(format!(
                            "predicate '{}' failed for '{}': {}",
                            predicate, name, e
                        ));
                        report.with_error(Error::Resolution {
                            entity: predicate,
                            source: e,
                        })
                    }
                }
            }
            Step::Aborted(reason) => {
                let value = self.hold_previous(entity, state)?;
                debug!(target: "reflow::engine", entity = name, reason = %reason, "Entity aborted");
                EntityReport::new(name, kind, Outcome::Aborted)
                    .with_value(value)
                    .with_error(Error::Resolution {
                        entity: name.to_string(),
                        source: ResolveError::AbortEntity(reason),
                    })
            }
            Step::Failed(e) => {
                let fallback = match kind {
                    EntityKind::Function => state.detector.previous_value(name).cloned(),
                    _ => None,
                };
                warn!(
                    target: "reflow::engine",
                    entity = name,
                    error = %e,
                    fallback = fallback.is_some(),
                    "Resolver failed"
                );
                match &fallback {
                    Some(value) => state.store.insert(name, value.clone())?,
                    None if kind.produces_value() => {
                        state.store.mark_failed(name, &e)?;
                        state
                            .failed
                            .insert(name.to_string(), vec![name.to_string()]);
                    }
                    None => {}
                }
                EntityReport::new(name, kind, Outcome::Failed)
                    .with_value(fallback)
                    .with_error(Error::Resolution {
                        entity: name.to_string(),
                        source: e,
                    })
            }
            Step::Upstream(chain) => {
                error!(
                    target: "reflow::engine",
                    entity = name,
                    chain = %chain.join(" -> "),
                    "Upstream resolution failed"
                );
                if kind.produces_value() {
                    let cause =
                        ResolveError::failed(format!("upstream chain {}", chain.join(" -> ")));
                    state.store.mark_failed(name, &cause)?;
                    state.failed.insert(name.to_string(), chain.clone());
                }
                if state.fatal.is_none() {
                    state.fatal = Some(Error::UpstreamResolution {
                        chain: chain.clone(),
                    });
                }
                EntityReport::new(name, kind, Outcome::UpstreamFailed)
                    .with_error(Error::UpstreamResolution { chain })
            }
            Step::AbortRun(e) => {
                error!(target: "reflow::engine", entity = name, reason = %e, "Run aborted");
                state.aborted = true;
                state.fatal = Some(Error::Resolution {
                    entity: name.to_string(),
                    source: e.clone(),
                });
                EntityReport::new(name, kind, Outcome::Aborted).with_error(Error::Resolution {
                    entity: name.to_string(),
                    source: e,
                })
            }
        };
        Ok(report)
    }

    // A Function that did not fire keeps its previous value, or the
    // unresolved sentinel when it never committed one.
    fn hold_previous(&self, entity: &Entity, state: &mut RunState) -> Result<Option<Value>> {
        if entity.kind() != EntityKind::Function {
            return Ok(None);
        }
        let value = state
            .detector
            .previous_value(entity.name())
            .cloned()
            .unwrap_or_else(|| self.unresolved.clone());
        state.store.insert(entity.name(), value.clone())?;
        Ok(Some(value))
    }

    // Fill in entities never reached, settle deferred Variables, and stage
    // persistent Variables that were resolved.
    fn finish(
        &self,
        order: &[&str],
        state: &mut RunState,
        reports: Vec<Option<EntityReport>>,
    ) -> Result<Vec<EntityReport>> {
        let mut entities = Vec::with_capacity(order.len());
        for (name, report) in order.iter().zip(reports) {
            let entity = self.registry.entity(name)?;
            let mut report = match report {
                Some(report) => report,
                None => EntityReport::new(name, entity.kind(), Outcome::NotEvaluated),
            };

            if entity.kind() == EntityKind::Variable {
                if report.outcome == Outcome::Deferred {
                    match state.store.deferred_outcome(name) {
                        Some(Ok(value)) => {
                            report.outcome = Outcome::Resolved;
                            report.value = Some(value.clone());
                        }
                        Some(Err(e)) => {
                            report.outcome = Outcome::Failed;
                            report.error = Some(Error::Resolution {
                                entity: name.to_string(),
                                source: e.clone(),
                            });
                        }
                        None => {}
                    }
                }
                if let Some(value) = state.store.peek(name) {
                    state
                        .detector
                        .commit(name, value.clone(), entity.is_persistent());
                }
            }
            entities.push(report);
        }
        Ok(entities)
    }
}

// Run a resolver or predicate, turning a panic into a failure of that entity.
fn guarded<T, F>(f: F) -> ResolveResult<T>
where
    F: FnOnce() -> ResolveResult<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            Err(ResolveError::failed(format!("resolver panicked: {}", message)))
        }
    }
}
