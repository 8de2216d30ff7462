//! Picking the next executable operation
//!
//! Both strategies lock what they return, skip-locked: a worker never waits
//! on a row another worker holds, and two workers never hold the same
//! operation. Neither returns an operation with a planned predecessor.

use crate::dependency::DependencyGraph;
use crate::error::SchedulerResult;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use wms_domain::operation::{planned_predecessors, schedule_order};
use wms_domain::{Avatar, AvatarId, Operation, OperationId};
use wms_store::Transaction;

/// Result of a readiness query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Locked operation whose predecessors are all executed
    Ready(Operation),
    /// No planned operation left: definitely nothing to do
    Exhausted,
    /// Work may remain but every candidate is held by someone else
    Contended,
}

impl Readiness {
    /// The ready operation, if any
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            Readiness::Ready(op) => Some(op),
            _ => None,
        }
    }
}

/// How workers find ready operations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStrategy {
    /// Lock the earliest planned operation, then climb its planned
    /// predecessors until one with none is found
    #[default]
    GraphClimb,
    /// Pick among operations whose inputs are all present and whose
    /// predecessors are all executed
    AvatarJoin,
}

impl ReadinessStrategy {
    /// Find and lock an operation ready to run
    ///
    /// Expects a fresh transaction so its snapshot reflects recent commits.
    pub fn select(&self, txn: &mut Transaction) -> SchedulerResult<Readiness> {
        match self {
            ReadinessStrategy::GraphClimb => graph_climb(txn),
            ReadinessStrategy::AvatarJoin => avatar_join(txn),
        }
    }

    /// Short name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            ReadinessStrategy::GraphClimb => "graph_climb",
            ReadinessStrategy::AvatarJoin => "avatar_join",
        }
    }
}

/// Find and lock an operation ready to run, climbing the graph
pub fn select_ready_operation(txn: &mut Transaction) -> SchedulerResult<Readiness> {
    graph_climb(txn)
}

fn planned_non_origin(txn: &Transaction) -> SchedulerResult<Vec<Operation>> {
    let mut candidates =
        txn.select::<Operation>(|op| op.is_planned() && !op.kind.is_origin())?;
    candidates.sort_by(schedule_order);
    Ok(candidates)
}

fn graph_climb(txn: &mut Transaction) -> SchedulerResult<Readiness> {
    let candidates = planned_non_origin(txn)?;
    let Some(mut current) = txn.lock_first(candidates)? else {
        return Ok(Readiness::Exhausted);
    };

    // Every step goes to a strictly earlier producer, so the climb ends
    loop {
        let predecessors = planned_predecessors(txn, &current)?;
        if predecessors.is_empty() {
            return Ok(Readiness::Ready(current));
        }
        match txn.lock_first(predecessors)? {
            Some(pred) => {
                tracing::trace!(from = %current.id, to = %pred.id, "climbing to predecessor");
                current = pred;
            }
            None => return Ok(Readiness::Contended),
        }
    }
}

fn avatar_join(txn: &mut Transaction) -> SchedulerResult<Readiness> {
    let operations = txn.scan::<Operation>()?;
    let graph = DependencyGraph::from_planned(&operations);
    let unblocked: HashSet<OperationId> = graph.ready().into_iter().collect();
    let present: HashMap<AvatarId, bool> = txn
        .scan::<Avatar>()?
        .into_iter()
        .map(|a| (a.id, a.is_available()))
        .collect();

    let mut candidates: Vec<Operation> = operations
        .into_iter()
        .filter(|op| op.is_planned() && !op.kind.is_origin())
        .filter(|op| unblocked.contains(&op.id))
        .filter(|op| {
            op.inputs
                .iter()
                .all(|input| present.get(input).copied().unwrap_or(false))
        })
        .collect();
    if candidates.is_empty() {
        return Ok(Readiness::Exhausted);
    }
    candidates.sort_by(schedule_order);

    Ok(match txn.lock_first(candidates)? {
        Some(op) => Readiness::Ready(op),
        None => Readiness::Contended,
    })
}
