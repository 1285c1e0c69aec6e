//! Entity Registry
//!
//! Holds entity and predicate declarations in declaration order. The
//! registry is populated at load time and frozen before the dependency
//! graph is built; registering after that is an error.

use std::collections::HashMap;

use reflow_core::{normalize_name, Error, Result};
use tracing::debug;

use crate::entity::{Entity, EntityKind};
use crate::predicate::Predicate;

/// Declarations of entities and predicates
#[derive(Debug, Default)]
pub struct Registry {
    entities: Vec<Entity>,
    entity_index: HashMap<String, usize>,
    predicates: Vec<Predicate>,
    predicate_index: HashMap<String, usize>,
    frozen: bool,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register an entity
    ///
    /// # Errors
    ///
    /// - `RegistryFrozen` after [`freeze`](Self::freeze)
    /// - `DuplicateName` if the name is taken
    /// - `InvalidDeclaration` for an empty name, or a Variable with
    ///   dependencies or predicates
    pub fn register(&mut self, entity: Entity) -> Result<()> {
        if self.frozen {
            return Err(Error::RegistryFrozen(entity.name().to_string()));
        }
        validate_name(entity.name())?;
        if entity.kind() == EntityKind::Variable && !entity.predicates().is_empty() {
            return Err(Error::InvalidDeclaration {
                name: entity.name().to_string(),
                reason: "variables cannot be gated by predicates".to_string(),
            });
        }
        if self.entity_index.contains_key(entity.name()) {
            return Err(Error::DuplicateName(entity.name().to_string()));
        }

        debug!(
            target: "reflow::engine",
            name = entity.name(),
            kind = %entity.kind(),
            persistent = entity.is_persistent(),
            "Registered entity"
        );
        self.entity_index
            .insert(entity.name().to_string(), self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    /// Register a predicate
    ///
    /// Predicates have their own namespace, separate from entities.
    pub fn register_predicate(&mut self, predicate: Predicate) -> Result<()> {
        if self.frozen {
            return Err(Error::RegistryFrozen(predicate.name().to_string()));
        }
        validate_name(predicate.name())?;
        if self.predicate_index.contains_key(predicate.name()) {
            return Err(Error::DuplicateName(predicate.name().to_string()));
        }
        self.predicate_index
            .insert(predicate.name().to_string(), self.predicates.len());
        self.predicates.push(predicate);
        Ok(())
    }

    /// Reject further registration
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Check whether the registry is frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// All entities in declaration order
    pub fn all_entities(&self) -> &[Entity] {
        &self.entities
    }

    /// All predicates in declaration order
    pub fn all_predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Look up an entity (the name is normalized first)
    pub fn entity(&self, name: &str) -> Result<&Entity> {
        self.find_entity(name)
            .ok_or_else(|| Error::NotFound(normalize_name(name)))
    }

    /// Look up a predicate (the name is normalized first)
    pub fn predicate(&self, name: &str) -> Result<&Predicate> {
        self.predicate_index
            .get(&normalize_name(name))
            .map(|&i| &self.predicates[i])
            .ok_or_else(|| Error::NotFound(normalize_name(name)))
    }

    /// Look up an entity without producing an error
    pub fn find_entity(&self, name: &str) -> Option<&Entity> {
        self.entity_index
            .get(&normalize_name(name))
            .map(|&i| &self.entities[i])
    }

    /// Declaration index of an entity
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entity_index.get(&normalize_name(name)).copied()
    }

    /// Check whether `name` is a registered persistent entity
    pub fn is_persistent(&self, name: &str) -> bool {
        self.find_entity(name).map_or(false, Entity::is_persistent)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True if no entity is registered
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidDeclaration {
            name: String::new(),
            reason: "name must not be empty".to_string(),
        });
    }
    if name.contains(reflow_core::ADDRESS_SEPARATOR) {
        return Err(Error::InvalidDeclaration {
            name: name.to_string(),
            reason: format!(
                "'{}' is reserved for sub-addressing",
                reflow_core::ADDRESS_SEPARATOR
            ),
        });
    }
    Ok(())
}
