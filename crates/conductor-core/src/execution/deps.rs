//! Dependency graph validation for plan steps.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. The
//! executor runs steps strictly in declared order, so this is a safety net
//! run once before execution: duplicate IDs, references to unknown steps,
//! and cycles are all rejected up front.

use std::collections::{HashMap, HashSet};

use conductor_types::plan::PlanStep;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

/// A structural defect in a plan's dependency declarations.
#[derive(Debug, thiserror::Error)]
pub enum DependencyGraphError {
    /// Two steps share the same ID.
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    /// A step references a dependency that is not in the plan.
    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: String, dependency: String },

    /// The dependency graph contains a cycle.
    #[error("cycle detected involving step '{0}'")]
    CycleDetected(String),
}

/// Validate that steps form a valid dependency graph.
///
/// Checks: unique step IDs, all referenced dependencies exist, no cycles.
pub fn validate_dependencies(steps: &[PlanStep]) -> Result<(), DependencyGraphError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.step_id.as_str()) {
            return Err(DependencyGraphError::DuplicateStepId(step.step_id.clone()));
        }
    }

    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.step_id.as_str(), i))
        .collect();

    // Build directed graph: edge from dependency -> dependent.
    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps
        .iter()
        .map(|s| graph.add_node(s.step_id.as_str()))
        .collect();

    for step in steps {
        let to_idx = id_to_idx[step.step_id.as_str()];
        for dep in &step.dependencies {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                DependencyGraphError::UnknownDependency {
                    step_id: step.step_id.clone(),
                    dependency: dep.clone(),
                }
            })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        DependencyGraphError::CycleDetected(graph[cycle.node_id()].to_string())
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
