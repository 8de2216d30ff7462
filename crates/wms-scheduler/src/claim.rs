//! Claiming reservation requests for planning

use crate::error::SchedulerResult;
use wms_domain::{RequestId, ReservationRequest};
use wms_store::Transaction;

/// Lock the first reserved request whose `planned` flag equals `planned`
///
/// The claim lives as long as `txn`: it is released on commit or rollback
/// and changes nothing by itself. Requests another transaction holds are
/// skipped.
pub fn claim_reservations(txn: &mut Transaction, planned: bool) -> SchedulerResult<Option<RequestId>> {
    let candidates = txn.select::<ReservationRequest>(|r| r.reserved && r.planned == planned)?;
    Ok(txn.lock_first(candidates)?.map(|r| r.id))
}

/// Flag a claimed request as planned so it is never claimed for planning again
pub fn mark_planned(txn: &mut Transaction, id: RequestId) -> SchedulerResult<()> {
    let mut request = txn.fetch::<ReservationRequest>(id)?;
    request.planned = true;
    txn.update(&request)?;
    Ok(())
}
