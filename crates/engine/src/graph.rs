//! Dependency Graph
//!
//! Built once from a frozen [`Registry`]. Construction validates that every
//! dependency and predicate read names a registered Variable or Function,
//! that every predicate exists, and that the edges form a DAG.
//!
//! Edges point from consumer to producer and use top-level names only; a
//! dependency on `relation:db:unit` is an edge to `relation`.
//!
//! The evaluation order is a topological sort (Kahn's algorithm) where ties
//! between ready entities are broken by declaration order, so two runs over
//! the same registry always visit entities in the same order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use reflow_core::{Error, Result};
use tracing::debug;

use crate::entity::EntityKind;
use crate::registry::Registry;

/// Validated, immutable dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    // producers[i]: distinct producers of entity i, declaration order
    producers: Vec<Vec<usize>>,
    consumers: Vec<Vec<usize>>,
    order: Vec<usize>,
    // positions[i]: index of entity i in `order`
    positions: Vec<usize>,
    waves: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    /// Validate the registry and build the graph
    ///
    /// # Errors
    ///
    /// - `UnresolvedDependency` for an unknown dependency, predicate, or
    ///   predicate read
    /// - `InvalidDependency` for a dependency or predicate read naming an Action
    /// - `CyclicDependency` with the full cycle path
    pub fn build(registry: &Registry) -> Result<Self> {
        let entities = registry.all_entities();
        let names: Vec<String> = entities.iter().map(|e| e.name().to_string()).collect();
        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut producers: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
        for (i, entity) in entities.iter().enumerate() {
            let mut reads: Vec<&str> = entity
                .dependency_names()
                .iter()
                .map(String::as_str)
                .collect();
            for predicate_name in entity.predicates() {
                let predicate =
                    registry
                        .predicate(predicate_name)
                        .map_err(|_| Error::UnresolvedDependency {
                            entity: entity.name().to_string(),
                            dependency: predicate_name.clone(),
                        })?;
                reads.extend(predicate.reads().iter().map(String::as_str));
            }

            for read in reads {
                let producer = *index.get(read).ok_or_else(|| Error::UnresolvedDependency {
                    entity: entity.name().to_string(),
                    dependency: read.to_string(),
                })?;
                if entities[producer].kind() == EntityKind::Action {
                    return Err(Error::InvalidDependency {
                        entity: entity.name().to_string(),
                        dependency: read.to_string(),
                    });
                }
                if !producers[i].contains(&producer) {
                    producers[i].push(producer);
                }
            }
        }

        detect_cycle(&names, &producers)?;

        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
        for (consumer, deps) in producers.iter().enumerate() {
            for &producer in deps {
                consumers[producer].push(consumer);
            }
        }

        let order = topological_order(&producers, &consumers);
        let mut positions = vec![0usize; order.len()];
        for (pos, &node) in order.iter().enumerate() {
            positions[node] = pos;
        }
        let waves = group_waves(&producers, &order);

        debug!(
            target: "reflow::graph",
            entities = names.len(),
            edges = producers.iter().map(Vec::len).sum::<usize>(),
            waves = waves.len(),
            "Dependency graph built"
        );

        Ok(DependencyGraph {
            names,
            index,
            producers,
            consumers,
            order,
            positions,
            waves,
        })
    }

    /// Entity names in evaluation order
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Entities grouped into waves; every producer sits in an earlier wave
    ///
    /// Within a wave, names keep their topological order.
    pub fn waves(&self) -> Vec<Vec<&str>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|&i| self.names[i].as_str()).collect())
            .collect()
    }

    /// Direct producers of `name` (dependencies plus predicate reads)
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(&self.producers, name)
    }

    /// Direct consumers of `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(&self.consumers, name)
    }

    fn neighbours(&self, table: &[Vec<usize>], name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| table[i].iter().map(|&j| self.names[j].as_str()).collect())
            .unwrap_or_default()
    }

    /// Position of `name` in the evaluation order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|&i| self.positions[i])
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if the graph has no entities
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// Three-color DFS. Roots and edges are visited in declaration order so the
// reported cycle is deterministic.
fn detect_cycle(names: &[String], producers: &[Vec<usize>]) -> Result<()> {
    let mut marks = vec![Mark::White; names.len()];
    let mut path: Vec<usize> = Vec::new();

    for root in 0..names.len() {
        if marks[root] != Mark::White {
            continue;
        }
        // Stack of (node, next edge to explore)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Gray;
        path.push(root);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if let Some(&next) = producers[node].get(frame.1) {
                frame.1 += 1;
                match marks[next] {
                    Mark::White => {
                        marks[next] = Mark::Gray;
                        path.push(next);
                        stack.push((next, 0));
                    }
                    Mark::Gray => {
                        let start = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|&n| names[n].clone()).collect();
                        cycle.push(names[next].clone());
                        return Err(Error::CyclicDependency { path: cycle });
                    }
                    Mark::Black => {}
                }
            } else {
                marks[node] = Mark::Black;
                path.pop();
                stack.pop();
            }
        }
    }
    Ok(())
}

fn topological_order(producers: &[Vec<usize>], consumers: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = producers.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(producers.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &consumer in &consumers[node] {
            in_degree[consumer] -= 1;
            if in_degree[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }
    order
}

fn group_waves(producers: &[Vec<usize>], order: &[usize]) -> Vec<Vec<usize>> {
    let mut level = vec![0usize; producers.len()];
    let mut waves: Vec<Vec<usize>> = Vec::new();
    for &node in order {
        let wave = producers[node]
            .iter()
            .map(|&p| level[p] + 1)
            .max()
            .unwrap_or(0);
        level[node] = wave;
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(node);
    }
    waves
}
