//! Error types for Reflow
//!
//! Two hierarchies live here:
//! - [`Error`]: structural and run-level failures reported by the engine
//! - [`ResolveError`]: what entity resolvers and predicates return
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for resolvers and predicates
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Error types for the engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (lock files, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entity or predicate with this name is already registered
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Lookup of an unregistered entity or predicate
    #[error("Not found: {0}")]
    NotFound(String),

    /// Registration attempted after the registry was frozen by the first run
    #[error("Registry is frozen, cannot register '{0}'")]
    RegistryFrozen(String),

    /// A declaration is malformed (empty name, self dependency, ...)
    #[error("Invalid declaration for '{name}': {reason}")]
    InvalidDeclaration {
        /// Entity or predicate name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// A dependency or predicate names nothing registered
    #[error("Entity '{entity}' depends on unknown name '{dependency}'")]
    UnresolvedDependency {
        /// Consumer entity
        entity: String,
        /// Missing producer name
        dependency: String,
    },

    /// A dependency names an action, which never produces a readable value
    #[error("Entity '{entity}' depends on action '{dependency}', which has no value")]
    InvalidDependency {
        /// Consumer entity
        entity: String,
        /// Action named as a dependency
        dependency: String,
    },

    /// The dependency edges (including predicate reads) contain a cycle
    #[error("Cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency {
        /// Full cycle, first name repeated at the end
        path: Vec<String>,
    },

    /// A resolver failed for this entity
    #[error("Entity '{entity}' failed to resolve: {source}")]
    Resolution {
        /// Failing entity
        entity: String,
        /// Resolver error
        #[source]
        source: ResolveError,
    },

    /// An entity could not resolve because a dependency had no value
    #[error("Upstream resolution failed: {}", chain.join(" -> "))]
    UpstreamResolution {
        /// Chain from the original failure to the entity that could not resolve
        chain: Vec<String>,
    },

    /// Snapshot read or write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Second write of a top-level context key within one run
    #[error("Key already exists in context: {0}")]
    KeyExists(String),

    /// A run binding names something that is not a registered variable
    #[error("Binding '{0}' does not name a registered variable")]
    UnknownBinding(String),

    /// Another run holds the run lock
    #[error("Run already in progress: {0}")]
    RunInProgress(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error is a structural (graph-build) error
    ///
    /// Structural errors are fatal at startup and never occur mid-run.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::DuplicateName(_)
                | Error::InvalidDeclaration { .. }
                | Error::UnresolvedDependency { .. }
                | Error::InvalidDependency { .. }
                | Error::CyclicDependency { .. }
        )
    }

    /// Names involved in the error, in order (cycle path or failure chain)
    pub fn chain(&self) -> &[String] {
        match self {
            Error::CyclicDependency { path } => path,
            Error::UpstreamResolution { chain } => chain,
            _ => &[],
        }
    }
}

/// Errors returned by entity resolvers and predicates
///
/// `AbortEntity` and `AbortRun` are control signals rather than failures:
/// the first stops only the current entity (it is treated as not fired),
/// the second ends the whole run without persisting anything.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// The resolver failed
    #[error("{0}")]
    Failed(String),

    /// Skip this entity for the current run
    #[error("Entity aborted: {0}")]
    AbortEntity(String),

    /// Abort the whole run
    #[error("Run aborted: {0}")]
    AbortRun(String),

    /// The resolver read a name it did not declare as a dependency
    #[error("Entity '{entity}' read undeclared name '{name}'")]
    UndeclaredRead {
        /// Reading entity
        entity: String,
        /// Name that was read
        name: String,
    },

    /// The name refers to an action marker, which has no readable value
    #[error("'{0}' is an action and has no readable value")]
    NotReadable(String),

    /// No value is present at this name or nested path
    #[error("No value at '{0}'")]
    Missing(String),

    /// A dependency failed while being forced for this reader
    #[error("Dependency '{dependency}' failed: {message}")]
    Upstream {
        /// Dependency that failed
        dependency: String,
        /// Its failure message
        message: String,
    },
}

impl ResolveError {
    /// Shorthand for [`ResolveError::Failed`]
    pub fn failed(message: impl Into<String>) -> Self {
        ResolveError::Failed(message.into())
    }

    /// Shorthand for [`ResolveError::AbortEntity`]
    pub fn abort_entity(reason: impl Into<String>) -> Self {
        ResolveError::AbortEntity(reason.into())
    }

    /// Shorthand for [`ResolveError::AbortRun`]
    pub fn abort_run(reason: impl Into<String>) -> Self {
        ResolveError::AbortRun(reason.into())
    }

    /// Shorthand for [`ResolveError::Upstream`]
    pub fn upstream(dependency: impl Into<String>, cause: &ResolveError) -> Self {
        ResolveError::Upstream {
            dependency: dependency.into(),
            message: cause.to_string(),
        }
    }

    /// Check if this error requests aborting the whole run
    pub fn is_abort_run(&self) -> bool {
        matches!(self, ResolveError::AbortRun(_))
    }

    /// Check if this error requests skipping the current entity
    pub fn is_abort_entity(&self) -> bool {
        matches!(self, ResolveError::AbortEntity(_))
    }
}
