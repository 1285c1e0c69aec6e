//! Run bindings
//!
//! Values supplied by the caller for one run, keyed by Variable name: the
//! parsed configuration, validated relation payloads, and similar externally
//! sourced data. A binding overrides the Variable's registered source for
//! that run only.

use std::collections::BTreeMap;
use std::sync::Arc;

use reflow_core::{normalize_name, ResolveResult, Value};

use crate::entity::VariableSource;

/// Per-run Variable values
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<String, VariableSource>,
}

impl Bindings {
    /// No bindings
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Bind a value, builder style
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind a value
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values
            .insert(normalize_name(name), VariableSource::Value(value.into()));
    }

    /// Bind a lazily computed value
    pub fn insert_deferred<F>(&mut self, name: &str, f: F)
    where
        F: Fn() -> ResolveResult<Value> + Send + Sync + 'static,
    {
        self.values
            .insert(normalize_name(name), VariableSource::Deferred(Arc::new(f)));
    }

    /// Bind parsed JSON, e.g. a relation payload
    pub fn insert_json(&mut self, name: &str, json: serde_json::Value) {
        self.insert(name, Value::from(json));
    }

    /// Bound names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<VariableSource> {
        self.values.remove(name)
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name.as_ref(), value);
        }
        bindings
    }
}
