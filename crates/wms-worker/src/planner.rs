//! Turns reserved requests into operations

use crate::continuous::ContinuousWork;
use chrono::{DateTime, Duration, Utc};
use wms_domain::goods::current_avatar;
use wms_domain::operation::{create_departure, create_move, create_unpack};
use wms_domain::reservation::reservations_of;
use wms_domain::{
    ContinuousKind, DomainError, DomainResult, GoodsId, Locations, Purpose, Reservation,
    ReservationRequest, SaleId,
};
use wms_metrics::names;
use wms_scheduler::{claim_reservations, mark_planned, SchedulerResult};
use wms_store::Transaction;

/// Lead time between planning and the first planned operation
const LEAD_TIME_MINUTES: i64 = 10;

/// Planner background work
///
/// Claims one reserved, unplanned request per unit and expands it:
/// - `unpack`: move each pack to stock, then unpack it there
/// - `sale:<id>`: move each unit to outgoing, then ship it for the sale
///
/// Requests with any other purpose are flagged planned without operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Planner;

impl ContinuousWork for Planner {
    const KIND: ContinuousKind = ContinuousKind::Planner;
    const PROCESSED: &'static str = names::REQUESTS_PLANNED;

    fn process_one(&mut self, txn: &mut Transaction) -> SchedulerResult<bool> {
        let Some(id) = claim_reservations(txn, false)? else {
            return Ok(false);
        };
        let request = txn.fetch::<ReservationRequest>(id)?;
        let reservations = reservations_of(txn, id)?;
        let locations = Locations::resolve(txn)?;
        let dt = Utc::now() + Duration::minutes(LEAD_TIME_MINUTES);

        match &request.purpose {
            Purpose::Label(label) if label == "unpack" => {
                plan_unpack(txn, &reservations, &locations, dt)?;
            }
            Purpose::LabelWithRef(label, sale) if label == "sale" => {
                plan_delivery(txn, &reservations, &locations, dt, SaleId::new(*sale))?;
            }
            other => {
                tracing::warn!(request = %id, purpose = other.label(), "no plan for purpose");
            }
        }
        mark_planned(txn, id)?;
        tracing::debug!(
            request = %id,
            purpose = request.purpose.label(),
            goods = reservations.len(),
            "planned request"
        );
        Ok(true)
    }
}

fn avatar_of(txn: &Transaction, goods: GoodsId) -> DomainResult<wms_domain::Avatar> {
    current_avatar(txn, goods)?
        .ok_or_else(|| DomainError::InvalidPlan(format!("reserved goods {} has no current avatar", goods)))
}

fn plan_unpack(
    txn: &mut Transaction,
    reservations: &[Reservation],
    locations: &Locations,
    dt: DateTime<Utc>,
) -> DomainResult<()> {
    for reservation in reservations {
        let avatar = avatar_of(txn, reservation.goods)?;
        let moved = create_move(txn, avatar.id, locations.stock, dt)?;
        create_unpack(txn, moved.outcomes[0], dt + Duration::minutes(LEAD_TIME_MINUTES))?;
    }
    Ok(())
}

fn plan_delivery(
    txn: &mut Transaction,
    reservations: &[Reservation],
    locations: &Locations,
    dt: DateTime<Utc>,
    sale: SaleId,
) -> DomainResult<()> {
    for reservation in reservations {
        let avatar = avatar_of(txn, reservation.goods)?;
        let moved = create_move(txn, avatar.id, locations.outgoing, dt)?;
        create_departure(
            txn,
            moved.outcomes[0],
            dt + Duration::minutes(LEAD_TIME_MINUTES),
            Some(sale),
        )?;
    }
    Ok(())
}
