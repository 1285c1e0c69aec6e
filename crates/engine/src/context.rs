//! Value Store and the read-only views handed to resolvers
//!
//! The store maps top-level entity names to the value each entity produced
//! in the current run. Writes go through the evaluator only; resolvers and
//! predicates see a [`ContextView`], which has no mutation methods and only
//! exposes the names its reader declared.
//!
//! ## Invariants
//!
//! - Write-once per top-level name per run (`Error::KeyExists` otherwise)
//! - Deferred values are forced at most once and cached for the run
//! - Action markers occupy their name but are never readable
//! - A Function that failed without a fallback occupies its name with the
//!   failure, so readers see an error rather than an absent value

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use reflow_core::{Address, Error, ResolveError, ResolveResult, Result, Value};

/// Zero-argument resolver producing a value on demand
pub type Thunk = Arc<dyn Fn() -> ResolveResult<Value> + Send + Sync>;

/// A lazily computed value, memoized on first force
pub struct Deferred {
    thunk: Thunk,
    cell: OnceCell<ResolveResult<Value>>,
}

impl Deferred {
    /// Wrap a thunk
    pub fn new(thunk: Thunk) -> Self {
        Deferred {
            thunk,
            cell: OnceCell::new(),
        }
    }

    /// Run the thunk on first call, return the cached outcome afterwards
    pub fn force(&self) -> ResolveResult<&Value> {
        match self.cell.get_or_init(|| (self.thunk)()) {
            Ok(value) => Ok(value),
            Err(e) => Err(e.clone()),
        }
    }

    /// True once the thunk has run (successfully or not)
    pub fn is_forced(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Outcome of the thunk, if it has run
    pub fn outcome(&self) -> Option<&ResolveResult<Value>> {
        self.cell.get()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("forced", &self.is_forced())
            .finish()
    }
}

#[derive(Debug)]
enum Slot {
    Ready(Value),
    Deferred(Deferred),
    Ran,
    Failed(ResolveError),
}

/// Per-run mapping from entity name to value
#[derive(Debug, Default)]
pub struct ValueStore {
    slots: HashMap<String, Slot>,
}

impl ValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        ValueStore::default()
    }

    fn claim(&mut self, name: &str, slot: Slot) -> Result<()> {
        if self.slots.contains_key(name) {
            return Err(Error::KeyExists(name.to_string()));
        }
        self.slots.insert(name.to_string(), slot);
        Ok(())
    }

    /// Insert a resolved value
    pub fn insert(&mut self, name: &str, value: Value) -> Result<()> {
        self.claim(name, Slot::Ready(value))
    }

    /// Insert a value that is computed on first read
    pub fn insert_deferred(&mut self, name: &str, thunk: Thunk) -> Result<()> {
        self.claim(name, Slot::Deferred(Deferred::new(thunk)))
    }

    /// Record that an action ran; the name becomes seen but not readable
    pub fn mark_ran(&mut self, name: &str) -> Result<()> {
        self.claim(name, Slot::Ran)
    }

    /// Record that `name` failed this run and has no value
    ///
    /// Later reads return [`ResolveError::Upstream`] naming `name`.
    pub fn mark_failed(&mut self, name: &str, cause: &ResolveError) -> Result<()> {
        let error = match cause {
            ResolveError::Upstream { .. } => cause.clone(),
            other => ResolveError::upstream(name, other),
        };
        self.claim(name, Slot::Failed(error))
    }

    /// Check whether `name` failed this run
    pub fn is_failed(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(Slot::Failed(_)))
    }

    /// Check whether anything occupies `name`
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Check whether `name` holds an action marker
    pub fn is_action_marker(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(Slot::Ran))
    }

    /// Number of occupied names
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Read a top-level value, forcing it if deferred
    pub fn get(&self, name: &str) -> ResolveResult<&Value> {
        match self.slots.get(name) {
            Some(Slot::Ready(value)) => Ok(value),
            Some(Slot::Deferred(deferred)) => deferred.force(),
            Some(Slot::Ran) => Err(ResolveError::NotReadable(name.to_string())),
            Some(Slot::Failed(e)) => Err(e.clone()),
            None => Err(ResolveError::Missing(name.to_string())),
        }
    }

    /// Value at `name` without forcing anything
    ///
    /// Returns the resolved value for ready slots and for deferred slots that
    /// were forced successfully.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        match self.slots.get(name)? {
            Slot::Ready(value) => Some(value),
            Slot::Deferred(deferred) => deferred.outcome()?.as_ref().ok(),
            Slot::Ran | Slot::Failed(_) => None,
        }
    }

    /// Outcome of a deferred slot, `None` if not deferred or never forced
    pub fn deferred_outcome(&self, name: &str) -> Option<&ResolveResult<Value>> {
        match self.slots.get(name)? {
            Slot::Deferred(deferred) => deferred.outcome(),
            _ => None,
        }
    }

    /// Read-only view for `reader`, limited to the names in `allowed`
    pub fn view<'a>(&'a self, reader: &'a str, allowed: &'a [String]) -> ContextView<'a> {
        ContextView {
            store: self,
            reader,
            allowed,
        }
    }
}

/// Read-only window onto the Value Store
///
/// Reads of names the reader did not declare fail with
/// [`ResolveError::UndeclaredRead`].
#[derive(Clone, Copy)]
pub struct ContextView<'a> {
    store: &'a ValueStore,
    reader: &'a str,
    allowed: &'a [String],
}

impl<'a> ContextView<'a> {
    /// Name of the entity or predicate this view was built for
    pub fn reader(&self) -> &str {
        self.reader
    }

    /// Names this view may read
    pub fn declared(&self) -> &[String] {
        self.allowed
    }

    /// Read a top-level value
    pub fn get(&self, name: &str) -> ResolveResult<&'a Value> {
        self.lookup(name)
    }

    /// Read a value by address, e.g. `relation:db:mysql/0`
    ///
    /// The top-level name must be declared; the remaining segments walk
    /// object keys and array indices of its value.
    pub fn lookup(&self, address: &str) -> ResolveResult<&'a Value> {
        let address = Address::parse(address);
        if !self.allowed.iter().any(|name| name == address.top()) {
            return Err(ResolveError::UndeclaredRead {
                entity: self.reader.to_string(),
                name: address.top().to_string(),
            });
        }
        let root = self
            .store
            .get(address.top())
            .map_err(|e| match e {
                ResolveError::Missing(_)
                | ResolveError::NotReadable(_)
                | ResolveError::Upstream { .. } => e,
                other => ResolveError::upstream(address.top(), &other),
            })?;
        root.lookup(address.path())
            .ok_or_else(|| ResolveError::Missing(address.to_string()))
    }

    /// Like [`lookup`](Self::lookup), but a missing value is `Ok(None)`
    pub fn try_lookup(&self, address: &str) -> ResolveResult<Option<&'a Value>> {
        match self.lookup(address) {
            Ok(value) => Ok(Some(value)),
            Err(ResolveError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read a string value
    pub fn get_str(&self, address: &str) -> ResolveResult<&'a str> {
        let value = self.lookup(address)?;
        value.as_str().ok_or_else(|| {
            ResolveError::failed(format!(
                "'{}' is {}, expected string",
                address,
                value.type_name()
            ))
        })
    }

    /// Read a boolean value
    pub fn get_bool(&self, address: &str) -> ResolveResult<bool> {
        let value = self.lookup(address)?;
        value.as_bool().ok_or_else(|| {
            ResolveError::failed(format!(
                "'{}' is {}, expected bool",
                address,
                value.type_name()
            ))
        })
    }
}

impl fmt::Debug for ContextView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextView")
            .field("reader", &self.reader)
            .field("declared", &self.allowed)
            .finish()
    }
}
