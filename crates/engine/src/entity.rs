//! Entity declarations
//!
//! An [`Entity`] is one node of the dependency graph:
//!
//! - `Variable`: a value, a deferred zero-argument resolver, or an external
//!   slot filled by run bindings. No dependencies.
//! - `Function`: resolver over its dependencies, produces a value.
//! - `Action`: resolver over its dependencies, run for side effects only.
//!
//! Names and dependency names are normalized on construction.

use std::fmt;
use std::sync::Arc;

use reflow_core::{normalize_name, Address, ResolveResult, Value};
use serde::{Deserialize, Serialize};

use crate::context::{ContextView, Thunk};
use crate::firing::FiringPolicy;

/// Function resolver
pub type Resolver = Arc<dyn Fn(&ContextView<'_>) -> ResolveResult<Value> + Send + Sync>;

/// Action resolver
pub type ActionResolver = Arc<dyn Fn(&ContextView<'_>) -> ResolveResult<()> + Send + Sync>;

/// Kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Input value
    Variable,
    /// Value-producing resolver
    Function,
    /// Side-effect resolver
    Action,
}

impl EntityKind {
    /// Lowercase name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Variable => "variable",
            EntityKind::Function => "function",
            EntityKind::Action => "action",
        }
    }

    /// Variables and Functions populate the Value Store; Actions do not
    pub fn produces_value(&self) -> bool {
        !matches!(self, EntityKind::Action)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a Variable's value comes from
#[derive(Clone)]
pub enum VariableSource {
    /// A concrete value
    Value(Value),
    /// Computed on first read
    Deferred(Thunk),
    /// Supplied by run bindings
    External,
}

impl VariableSource {
    /// Deferred source from a closure
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn() -> ResolveResult<Value> + Send + Sync + 'static,
    {
        VariableSource::Deferred(Arc::new(f))
    }
}

impl fmt::Debug for VariableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableSource::Value(v) => f.debug_tuple("Value").field(v).finish(),
            VariableSource::Deferred(_) => f.write_str("Deferred(..)"),
            VariableSource::External => f.write_str("External"),
        }
    }
}

impl From<Value> for VariableSource {
    fn from(value: Value) -> Self {
        VariableSource::Value(value)
    }
}

#[derive(Clone)]
pub(crate) enum Body {
    Variable(VariableSource),
    Function(Resolver),
    Action(ActionResolver),
}

/// A registered unit of the dependency graph
#[derive(Clone)]
pub struct Entity {
    name: String,
    body: Body,
    dependencies: Vec<Address>,
    reads: Vec<String>,
    predicates: Vec<String>,
    persistent: bool,
    firing: FiringPolicy,
}

impl Entity {
    fn new(name: &str, body: Body) -> Self {
        Entity {
            name: normalize_name(name),
            body,
            dependencies: Vec::new(),
            reads: Vec::new(),
            predicates: Vec::new(),
            persistent: false,
            firing: FiringPolicy::default(),
        }
    }

    /// Variable holding a concrete value
    pub fn variable(name: &str, value: impl Into<Value>) -> Self {
        Entity::new(name, Body::Variable(VariableSource::Value(value.into())))
    }

    /// Variable from any [`VariableSource`]
    pub fn with_source(name: &str, source: VariableSource) -> Self {
        Entity::new(name, Body::Variable(source))
    }

    /// Variable resolved lazily on first read
    pub fn deferred_variable<F>(name: &str, f: F) -> Self
    where
        F: Fn() -> ResolveResult<Value> + Send + Sync + 'static,
    {
        Entity::new(name, Body::Variable(VariableSource::deferred(f)))
    }

    /// Variable whose value must be supplied by run bindings
    pub fn external(name: &str) -> Self {
        Entity::new(name, Body::Variable(VariableSource::External))
    }

    /// Function over `dependencies`
    pub fn function<I, S, F>(name: &str, dependencies: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&ContextView<'_>) -> ResolveResult<Value> + Send + Sync + 'static,
    {
        Entity::new(name, Body::Function(Arc::new(f))).with_dependencies(dependencies)
    }

    /// Action over `dependencies`
    pub fn action<I, S, F>(name: &str, dependencies: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&ContextView<'_>) -> ResolveResult<()> + Send + Sync + 'static,
    {
        Entity::new(name, Body::Action(Arc::new(f))).with_dependencies(dependencies)
    }

    fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dependencies = dependencies
            .into_iter()
            .map(|d| Address::parse(d.as_ref()))
            .collect();
        self.reads = Vec::new();
        for dep in &self.dependencies {
            if !self.reads.iter().any(|r| r == dep.top()) {
                self.reads.push(dep.top().to_string());
            }
        }
        self
    }

    /// Set the persistence flag
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Gate firing on the named predicates (all must pass)
    pub fn with_predicates<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.predicates = predicates
            .into_iter()
            .map(|p| normalize_name(p.as_ref()))
            .collect();
        self
    }

    /// Override the firing policy
    pub fn with_firing(mut self, firing: FiringPolicy) -> Self {
        self.firing = firing;
        self
    }

    /// Normalized name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity kind
    pub fn kind(&self) -> EntityKind {
        match self.body {
            Body::Variable(_) => EntityKind::Variable,
            Body::Function(_) => EntityKind::Function,
            Body::Action(_) => EntityKind::Action,
        }
    }

    /// Declared dependencies, possibly sub-addressed
    pub fn dependencies(&self) -> &[Address] {
        &self.dependencies
    }

    /// Distinct top-level dependency names, in declaration order
    pub fn dependency_names(&self) -> &[String] {
        &self.reads
    }

    /// Gating predicate names
    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    /// Persistence flag
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Firing policy
    pub fn firing(&self) -> &FiringPolicy {
        &self.firing
    }

    pub(crate) fn body(&self) -> &Body {
        &self.body
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("dependencies", &self.reads)
            .field("predicates", &self.predicates)
            .field("persistent", &self.persistent)
            .field("firing", &self.firing)
            .finish()
    }
}
