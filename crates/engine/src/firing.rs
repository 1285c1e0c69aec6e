//! Firing policies
//!
//! A persistent Function or Action that already has a snapshot fires only
//! when its policy accepts the set of dependency change flags for the run.
//! The default, [`FiringPolicy::AnyChanged`], fires when any dependency
//! differs from its snapshot. This is coarse and can over-fire; the other
//! policies let an entity gate more precisely.

use std::fmt;
use std::sync::Arc;

/// Per-dependency change flags for one entity in one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<(String, bool)>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        ChangeSet::default()
    }

    /// Record whether `dependency` changed
    pub fn record(&mut self, dependency: impl Into<String>, changed: bool) {
        self.entries.push((dependency.into(), changed));
    }

    /// Change flag for `dependency`, `None` if it is not a dependency
    pub fn changed(&self, dependency: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(name, _)| name == dependency)
            .map(|(_, changed)| *changed)
    }

    /// True if any dependency changed
    pub fn any(&self) -> bool {
        self.entries.iter().any(|(_, changed)| *changed)
    }

    /// True if there is at least one dependency and all of them changed
    pub fn all(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, changed)| *changed)
    }

    /// Names of the dependencies that changed
    pub fn changed_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, changed)| *changed)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Number of dependencies recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no dependency was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Custom firing predicate over a [`ChangeSet`]
pub type FiringFn = Arc<dyn Fn(&ChangeSet) -> bool + Send + Sync>;

/// When a persistent entity with a snapshot fires
#[derive(Clone, Default)]
pub enum FiringPolicy {
    /// Fire if any dependency changed
    #[default]
    AnyChanged,
    /// Fire only if every dependency changed
    AllChanged,
    /// Fire when the closure returns true
    Custom(FiringFn),
}

impl FiringPolicy {
    /// Build a custom policy
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ChangeSet) -> bool + Send + Sync + 'static,
    {
        FiringPolicy::Custom(Arc::new(f))
    }

    /// Decide whether to fire for this run's change flags
    pub fn should_fire(&self, changes: &ChangeSet) -> bool {
        match self {
            FiringPolicy::AnyChanged => changes.any(),
            FiringPolicy::AllChanged => changes.all(),
            FiringPolicy::Custom(f) => f(changes),
        }
    }
}

impl fmt::Debug for FiringPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiringPolicy::AnyChanged => f.write_str("AnyChanged"),
            FiringPolicy::AllChanged => f.write_str("AllChanged"),
            FiringPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
