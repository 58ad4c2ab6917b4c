// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::dag::step::StepInfo;
use crate::engine::StepKey;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct StepNode {
    /// Direct dependencies: steps that must finish before this one.
    deps: Vec<StepKey>,
    /// Direct dependents: steps that declare this one as a dependency.
    dependents: Vec<StepKey>,
}

/// In-memory dependency adjacency keyed by step key.
///
/// Acyclicity is validated separately in `config::validate`; here we
/// keep adjacency for readiness checks and descendant cancellation.
/// The ALL-step is recorded but carries no materialised edges; its
/// virtual dependency on everything is computed by the scheduler on
/// demand.
#[derive(Debug, Clone)]
pub struct StepGraph {
    nodes: BTreeMap<StepKey, StepNode>,
    all_step: Option<StepKey>,
}

impl StepGraph {
    /// Build adjacency from resolved steps.
    pub fn from_steps(steps: &BTreeMap<StepKey, StepInfo>) -> Self {
        let mut nodes: BTreeMap<StepKey, StepNode> = BTreeMap::new();
        let mut all_step = None;

        for (key, info) in steps {
            if info.is_all {
                all_step = Some(key.clone());
            }
            nodes.insert(
                key.clone(),
                StepNode {
                    deps: info.deps.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        let keys: Vec<StepKey> = nodes.keys().cloned().collect();
        for key in keys {
            let deps = nodes
                .get(&key)
                .map(|n| n.deps.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(key.clone());
                }
            }
        }

        Self { nodes, all_step }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Key of the ALL-step, if one is declared.
    pub fn all_step(&self) -> Option<&str> {
        self.all_step.as_deref()
    }

    /// Immediate declared dependencies of a step.
    pub fn dependencies_of(&self, key: &str) -> &[StepKey] {
        self.nodes
            .get(key)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a step.
    pub fn dependents_of(&self, key: &str) -> &[StepKey] {
        self.nodes
            .get(key)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// All transitive dependents of a step, in key order.
    pub fn descendants_of(&self, key: &str) -> Vec<StepKey> {
        let mut found: BTreeSet<StepKey> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(key);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(current) {
                if found.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        found.into_iter().collect()
    }
}
