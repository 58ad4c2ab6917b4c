// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::step::StepInfo;
use crate::engine::StepKey;
use crate::errors::{Result, RunJobError};

/// Enforce the graph invariants on resolved steps:
///
/// 1. every dependency references an existing step,
/// 2. at most one step declares `dependencies = "ALL"`,
/// 3. no step depends on the ALL-step (that edge closes a cycle with
///    the ALL-step's virtual dependency on everything),
/// 4. the graph excluding the ALL-step is acyclic.
///
/// Duplicate keys are rejected earlier, during deserialization.
pub fn validate_steps(steps: &BTreeMap<StepKey, StepInfo>) -> Result<()> {
    ensure_has_steps(steps)?;
    let all_step = find_all_step(steps)?;
    validate_dependencies(steps, all_step)?;
    validate_acyclic(steps, all_step)?;
    Ok(())
}

fn ensure_has_steps(steps: &BTreeMap<StepKey, StepInfo>) -> Result<()> {
    if steps.is_empty() {
        return Err(RunJobError::ConfigError(
            "config must contain at least one step".to_string(),
        ));
    }
    Ok(())
}

fn find_all_step(steps: &BTreeMap<StepKey, StepInfo>) -> Result<Option<&str>> {
    let mut all_step: Option<&str> = None;
    for info in steps.values() {
        if !info.is_all {
            continue;
        }
        match all_step {
            None => all_step = Some(&info.key),
            Some(first) => {
                return Err(RunJobError::MultipleAllSteps {
                    first: first.to_string(),
                    second: info.key.clone(),
                })
            }
        }
    }
    Ok(all_step)
}

fn validate_dependencies(
    steps: &BTreeMap<StepKey, StepInfo>,
    all_step: Option<&str>,
) -> Result<()> {
    for info in steps.values() {
        for dep in &info.deps {
            if !steps.contains_key(dep) {
                return Err(RunJobError::DanglingDependency {
                    step: info.key.clone(),
                    dependency: dep.clone(),
                });
            }
            if Some(dep.as_str()) == all_step {
                return Err(RunJobError::CycleDetected(format!(
                    "step '{}' depends on the ALL step '{dep}'",
                    info.key
                )));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(
    steps: &BTreeMap<StepKey, StepInfo>,
    all_step: Option<&str>,
) -> Result<()> {
    // Edge direction: dep -> step. The ALL-step is excluded; its
    // virtual edges cannot introduce a cycle once nothing depends on it.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for info in steps.values() {
        if Some(info.key.as_str()) == all_step {
            continue;
        }
        graph.add_node(info.key.as_str());
        for dep in &info.deps {
            graph.add_edge(dep.as_str(), info.key.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(RunJobError::CycleDetected(format!(
            "cycle involving step '{}'",
            cycle.node_id()
        ))),
    }
}
