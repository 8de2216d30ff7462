//! Binds goods to pending reservation requests

use crate::continuous::ContinuousWork;
use wms_domain::reservation::reserve_one;
use wms_domain::ContinuousKind;
use wms_metrics::names;
use wms_scheduler::SchedulerResult;
use wms_store::Transaction;

/// Reserver background work: one fully reserved request per unit
#[derive(Clone, Copy, Debug, Default)]
pub struct Reserver;

impl ContinuousWork for Reserver {
    const KIND: ContinuousKind = ContinuousKind::Reserver;
    const PROCESSED: &'static str = names::REQUESTS_RESERVED;

    fn process_one(&mut self, txn: &mut Transaction) -> SchedulerResult<bool> {
        Ok(reserve_one(txn)?.is_some())
    }
}
