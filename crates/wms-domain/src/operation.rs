//! Operations: the nodes of the dependency graph workers execute
//!
//! An operation consumes input avatars and produces outcome avatars. It
//! `follows` the operations that produced its inputs, and may only run once
//! all of them are executed. Execution is monotonic: `Planned` → `Executed`.

use crate::error::{DomainError, DomainResult};
use crate::goods::{Avatar, AvatarState, Goods, GoodsType};
use crate::ids::{AvatarId, GoodsId, GoodsTypeId, LocationId, OperationId, SaleId};
use chrono::{DateTime, Utc};
use wms_store::{Record, TableName, Transaction};

/// Operation lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationState {
    /// Waiting to be executed
    Planned,
    /// Done; never goes back
    Executed,
}

/// What an operation does
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Goods entering the warehouse; has no prerequisites
    Arrival {
        /// Type of the arriving goods
        goods_type: GoodsTypeId,
        /// Where it arrives
        location: LocationId,
        /// Timeslice it is expected in
        timeslice: u32,
    },
    /// Goods moving to another location
    Move {
        /// Target location
        destination: LocationId,
    },
    /// A pack opened into its contents
    Unpack,
    /// Goods leaving the warehouse
    Departure {
        /// Sale it fulfils, if any
        sale: Option<SaleId>,
    },
}

impl OperationKind {
    /// Short name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Arrival { .. } => "arrival",
            OperationKind::Move { .. } => "move",
            OperationKind::Unpack => "unpack",
            OperationKind::Departure { .. } => "departure",
        }
    }

    /// Origin operations have no predecessors and are picked through their own path
    pub fn is_origin(&self) -> bool {
        matches!(self, OperationKind::Arrival { .. })
    }
}

/// A unit of work in the dependency graph
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    /// Operation id
    pub id: OperationId,
    /// What it does
    pub kind: OperationKind,
    /// Lifecycle state
    pub state: OperationState,
    /// Scheduled execution time
    pub dt_execution: DateTime<Utc>,
    /// Operations that must be executed first
    pub follows: Vec<OperationId>,
    /// Consumed avatars
    pub inputs: Vec<AvatarId>,
    /// Produced avatars
    pub outcomes: Vec<AvatarId>,
}

impl Operation {
    /// Whether the operation still has to run
    pub fn is_planned(&self) -> bool {
        self.state == OperationState::Planned
    }
}

impl Record for Operation {
    const TABLE: TableName = "operation";
    type Id = OperationId;

    fn id(&self) -> OperationId {
        self.id
    }
}

/// Ordering used everywhere operations compete: earliest scheduled first,
/// then insertion order.
pub fn schedule_order(a: &Operation, b: &Operation) -> std::cmp::Ordering {
    a.dt_execution
        .cmp(&b.dt_execution)
        .then_with(|| a.id.cmp(&b.id))
}

/// Predecessors of `op` still in `Planned` state, in schedule order
pub fn planned_predecessors(txn: &Transaction, op: &Operation) -> DomainResult<Vec<Operation>> {
    let mut planned = Vec::with_capacity(op.follows.len());
    for id in &op.follows {
        let pred = txn.fetch::<Operation>(*id)?;
        if pred.is_planned() {
            planned.push(pred);
        }
    }
    planned.sort_by(schedule_order);
    Ok(planned)
}

// ==================== Creation ====================

fn new_future_avatar(
    txn: &mut Transaction,
    goods: GoodsId,
    location: LocationId,
    dt_from: DateTime<Utc>,
    reason: OperationId,
) -> DomainResult<AvatarId> {
    let id = txn.allocate::<Avatar>();
    txn.insert(Avatar {
        id,
        goods,
        location,
        state: AvatarState::Future,
        dt_from,
        dt_until: None,
        reason,
    })?;
    Ok(id)
}

fn new_goods(txn: &mut Transaction, goods_type: GoodsTypeId) -> DomainResult<GoodsId> {
    let id = txn.allocate::<Goods>();
    txn.insert(Goods { id, goods_type })?;
    Ok(id)
}

/// Close the validity of a planned input at `dt`, locking it
fn take_input(txn: &mut Transaction, input: AvatarId, dt: DateTime<Utc>) -> DomainResult<Avatar> {
    let mut avatar = txn.fetch::<Avatar>(input)?;
    if !avatar.is_current() {
        return Err(DomainError::InvalidPlan(format!(
            "avatar {} is already consumed or planned away",
            input
        )));
    }
    avatar.dt_until = Some(dt);
    txn.update(&avatar)?;
    Ok(avatar)
}

fn insert_operation(
    txn: &mut Transaction,
    id: OperationId,
    kind: OperationKind,
    dt_execution: DateTime<Utc>,
    inputs: Vec<AvatarId>,
    outcomes: Vec<AvatarId>,
    follows: Vec<OperationId>,
) -> DomainResult<Operation> {
    let op = Operation {
        id,
        kind,
        state: OperationState::Planned,
        dt_execution,
        follows,
        inputs,
        outcomes,
    };
    txn.insert(op.clone())?;
    tracing::debug!(op = %op.id, kind = op.kind.name(), "planned operation");
    Ok(op)
}

/// Plan the arrival of one new goods of `goods_type`
pub fn create_arrival(
    txn: &mut Transaction,
    goods_type: GoodsTypeId,
    location: LocationId,
    timeslice: u32,
    dt_execution: DateTime<Utc>,
) -> DomainResult<Operation> {
    let id = txn.allocate::<Operation>();
    let goods = new_goods(txn, goods_type)?;
    let outcome = new_future_avatar(txn, goods, location, dt_execution, id)?;
    insert_operation(
        txn,
        id,
        OperationKind::Arrival {
            goods_type,
            location,
            timeslice,
        },
        dt_execution,
        Vec::new(),
        vec![outcome],
        Vec::new(),
    )
}

/// Plan moving the goods of `input` to `destination`
pub fn create_move(
    txn: &mut Transaction,
    input: AvatarId,
    destination: LocationId,
    dt_execution: DateTime<Utc>,
) -> DomainResult<Operation> {
    let id = txn.allocate::<Operation>();
    let avatar = take_input(txn, input, dt_execution)?;
    let outcome = new_future_avatar(txn, avatar.goods, destination, dt_execution, id)?;
    insert_operation(
        txn,
        id,
        OperationKind::Move { destination },
        dt_execution,
        vec![input],
        vec![outcome],
        vec![avatar.reason],
    )
}

/// Plan unpacking the pack of `input` where it stands
pub fn create_unpack(
    txn: &mut Transaction,
    input: AvatarId,
    dt_execution: DateTime<Utc>,
) -> DomainResult<Operation> {
    let id = txn.allocate::<Operation>();
    let avatar = take_input(txn, input, dt_execution)?;
    let goods = txn.fetch::<Goods>(avatar.goods)?;
    let pack_type = txn.fetch::<GoodsType>(goods.goods_type)?;
    let behaviour = pack_type.unpack.ok_or_else(|| {
        DomainError::InvalidPlan(format!("goods type {} cannot be unpacked", pack_type.code))
    })?;

    let mut outcomes = Vec::with_capacity(behaviour.quantity as usize);
    for _ in 0..behaviour.quantity {
        let unit = new_goods(txn, behaviour.outcome_type)?;
        outcomes.push(new_future_avatar(txn, unit, avatar.location, dt_execution, id)?);
    }
    insert_operation(
        txn,
        id,
        OperationKind::Unpack,
        dt_execution,
        vec![input],
        outcomes,
        vec![avatar.reason],
    )
}

/// Plan the departure of the goods of `input`
pub fn create_departure(
    txn: &mut Transaction,
    input: AvatarId,
    dt_execution: DateTime<Utc>,
    sale: Option<SaleId>,
) -> DomainResult<Operation> {
    let id = txn.allocate::<Operation>();
    let avatar = take_input(txn, input, dt_execution)?;
    insert_operation(
        txn,
        id,
        OperationKind::Departure { sale },
        dt_execution,
        vec![input],
        Vec::new(),
        vec![avatar.reason],
    )
}

// ==================== Execution ====================

/// Execute an operation
///
/// No-op on an already executed operation. Fails with
/// [`DomainError::PreconditionNotMet`] if an input is not present, leaving
/// everything untouched.
pub fn execute(txn: &mut Transaction, id: OperationId) -> DomainResult<Operation> {
    let mut op = txn.fetch::<Operation>(id)?;
    if !op.is_planned() {
        return Ok(op);
    }

    let mut inputs = Vec::with_capacity(op.inputs.len());
    for avatar_id in &op.inputs {
        let avatar = txn.fetch::<Avatar>(*avatar_id)?;
        if !avatar.is_available() {
            return Err(DomainError::PreconditionNotMet {
                op: id,
                avatar: *avatar_id,
                reason: format!("{:?}", avatar.state).to_lowercase(),
            });
        }
        inputs.push(avatar);
    }

    let now = Utc::now();
    for mut avatar in inputs {
        avatar.state = AvatarState::Past;
        avatar.dt_until = Some(now);
        txn.update(&avatar)?;
    }
    for avatar_id in &op.outcomes {
        let mut avatar = txn.fetch::<Avatar>(*avatar_id)?;
        if avatar.state == AvatarState::Future {
            avatar.state = AvatarState::Present;
            avatar.dt_from = now;
            txn.update(&avatar)?;
        }
    }

    op.state = OperationState::Executed;
    txn.update(&op)?;
    tracing::debug!(op = %op.id, kind = op.kind.name(), "executed operation");
    Ok(op)
}
