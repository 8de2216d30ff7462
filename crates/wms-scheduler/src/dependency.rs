//! Dependency graph over planned operations
//!
//! Edges come from the `follows` relation: an operation waits on each of
//! its predecessors. Only planned operations are nodes; an edge from an
//! executed predecessor is already satisfied and is left out.

use std::collections::{BTreeMap, BTreeSet};
use wms_domain::{Operation, OperationId};

/// Dependency graph of operations
///
/// Nodes are kept ordered so iteration follows operation ids.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// op -> planned operations it waits on
    waits_on: BTreeMap<OperationId, BTreeSet<OperationId>>,
}

impl DependencyGraph {
    /// Build the graph of the planned operations among `operations`
    pub fn from_planned<'a, I>(operations: I) -> Self
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let planned: Vec<&Operation> = operations.into_iter().filter(|op| op.is_planned()).collect();
        let mut waits_on: BTreeMap<OperationId, BTreeSet<OperationId>> =
            planned.iter().map(|op| (op.id, BTreeSet::new())).collect();
        for op in &planned {
            let pending: BTreeSet<OperationId> = op
                .follows
                .iter()
                .copied()
                .filter(|pred| waits_on.contains_key(pred))
                .collect();
            if let Some(deps) = waits_on.get_mut(&op.id) {
                deps.extend(pending);
            }
        }
        Self { waits_on }
    }

    /// Nodes with no unsatisfied dependency, by id
    pub fn ready(&self) -> Vec<OperationId> {
        self.waits_on
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }
}
