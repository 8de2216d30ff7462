//! Start-of-timeslice business work
//!
//! Before draining operations each regular worker:
//! 1. executes arrivals due by the current timeslice
//! 2. purchases a pack for every product out of stock, arriving two
//!    timeslices later and reserved for unpacking
//! 3. records a few random sales

use crate::error::WorkerResult;
use crate::regular::TimesliceHook;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use wms_domain::goods::goods_type_by_code;
use wms_domain::operation::{create_arrival, execute, schedule_order};
use wms_domain::reservation::{insert_request, insert_request_item, insert_reservation};
use wms_domain::sale::create_random_sale;
use wms_domain::seed::pack_code;
use wms_domain::stock::missing_products;
use wms_domain::{Avatar, DomainResult, GoodsType, Locations, Operation, OperationId, OperationKind, Purpose};
use wms_metrics::names;
use wms_scheduler::{ConflictRetryLoop, UnitOutcome};
use wms_store::Transaction;

/// Products considered per purchase query
const PURCHASE_BATCH: usize = 10;

/// Delay between a purchase and its arrival, in timeslices
const ARRIVAL_DELAY: u32 = 2;

/// Buys missing stock and sells to random customers
pub struct Seller {
    products: Vec<String>,
    sales_per_timeslice: u32,
    rng: StdRng,
}

impl Seller {
    /// Seller over `products`, recording `sales_per_timeslice` sales each timeslice
    pub fn new(products: Vec<String>, sales_per_timeslice: u32, seed: u64) -> Self {
        Self {
            products,
            sales_per_timeslice,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn process_arrivals(&self, runner: &ConflictRetryLoop, timeslice: u32) -> WorkerResult<usize> {
        let mut executed = 0;
        loop {
            match runner.run("process_arrival", |txn| Ok(process_arrival(txn, timeslice)?))? {
                UnitOutcome::Committed(Some(_)) => executed += 1,
                UnitOutcome::Committed(None) => return Ok(executed),
                UnitOutcome::Retry => continue,
                // Leave the rest to the drain
                UnitOutcome::Skipped => return Ok(executed),
            }
        }
    }

    fn purchase(&self, runner: &ConflictRetryLoop, timeslice: u32) -> WorkerResult<usize> {
        let mut purchased = 0;
        loop {
            match runner.run("purchase", |txn| Ok(purchase_one(txn, timeslice)?))? {
                UnitOutcome::Committed(Some(product)) => {
                    tracing::debug!(%product, arrives = timeslice + ARRIVAL_DELAY, "purchased");
                    runner.metrics().incr(names::PURCHASES);
                    purchased += 1;
                }
                UnitOutcome::Committed(None) | UnitOutcome::Skipped => return Ok(purchased),
                UnitOutcome::Retry => continue,
            }
        }
    }

    fn sell(&mut self, runner: &ConflictRetryLoop) -> WorkerResult<u32> {
        let mut sold = 0;
        for _ in 0..self.sales_per_timeslice {
            let (products, rng) = (&self.products, &mut self.rng);
            let outcome = runner.run("sale", |txn| {
                let (sale, _) = create_random_sale(txn, rng, products)?;
                Ok(sale.id)
            })?;
            if outcome.committed().is_some() {
                runner.metrics().incr(names::SALES);
                sold += 1;
            }
        }
        Ok(sold)
    }
}

impl TimesliceHook for Seller {
    fn begin_timeslice(&mut self, runner: &ConflictRetryLoop, timeslice: u32) -> WorkerResult<()> {
        let arrivals = self.process_arrivals(runner, timeslice)?;
        let purchases = self.purchase(runner, timeslice)?;
        let sales = if self.products.is_empty() { 0 } else { self.sell(runner)? };
        tracing::debug!(timeslice, arrivals, purchases, sales, "timeslice started");
        Ok(())
    }
}

/// Execute one planned arrival due by `timeslice`
pub fn process_arrival(txn: &mut Transaction, timeslice: u32) -> DomainResult<Option<OperationId>> {
    let mut due = txn.select::<Operation>(|op| {
        op.is_planned()
            && matches!(op.kind, OperationKind::Arrival { timeslice: at, .. } if at <= timeslice)
    })?;
    due.sort_by(schedule_order);
    let Some(arrival) = txn.lock_first(due)? else {
        return Ok(None);
    };
    execute(txn, arrival.id)?;
    Ok(Some(arrival.id))
}

/// Purchase one pack of the first missing product nobody else is buying
///
/// The pack goods type row is locked and rewritten so that two purchases
/// of the same product from different snapshots conflict.
pub fn purchase_one(txn: &mut Transaction, timeslice: u32) -> DomainResult<Option<String>> {
    let missing = missing_products(txn, PURCHASE_BATCH)?;
    if missing.is_empty() {
        return Ok(None);
    }
    let mut packs = Vec::with_capacity(missing.len());
    for product in &missing {
        packs.push(goods_type_by_code(txn, &pack_code(product))?);
    }
    let Some(pack) = txn.lock_first::<GoodsType, _>(packs)? else {
        return Ok(None);
    };
    txn.update(&pack)?;

    let locations = Locations::resolve(txn)?;
    let dt_execution = Utc::now() + Duration::minutes(10);
    let arrival = create_arrival(
        txn,
        pack.id,
        locations.incoming,
        timeslice + ARRIVAL_DELAY,
        dt_execution,
    )?;

    let request = insert_request(txn, Purpose::unpack(), true)?;
    let item = insert_request_item(txn, request.id, pack.id, 1)?;
    for outcome in &arrival.outcomes {
        let avatar = txn.fetch::<Avatar>(*outcome)?;
        insert_reservation(txn, avatar.goods, item.id)?;
    }
    Ok(pack.product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wms_domain::reservation::reservations_of;
    use wms_domain::seed::{install, SeedConfig};
    use wms_domain::{ReservationRequest, Sale};
    use wms_metrics::WorkerMetrics;
    use wms_scheduler::Shutdown;
    use wms_store::Store;

    fn seeded() -> Store {
        let store = Store::new();
        install(&store, &SeedConfig::small()).unwrap();
        store
    }

    fn runner(store: &Store) -> ConflictRetryLoop {
        ConflictRetryLoop::new(store.clone(), Arc::new(WorkerMetrics::new("regular", 0)), Shutdown::never())
    }

    // ==================== Purchase Tests ====================

    #[test]
    fn test_purchase_covers_every_missing_product() {
        let store = seeded();
        let runner = runner(&store);
        let seller = Seller::new(SeedConfig::small().products(), 0, 1);

        assert_eq!(seller.purchase(&runner, 1).unwrap(), 2);
        // Future stock counts: nothing left to buy
        assert_eq!(seller.purchase(&runner, 1).unwrap(), 0);
        assert_eq!(runner.metrics().counter(names::PURCHASES), 2);

        let txn = store.begin();
        let arrivals = txn
            .select::<Operation>(|op| matches!(op.kind, OperationKind::Arrival { timeslice: 3, .. }))
            .unwrap();
        assert_eq!(arrivals.len(), 2);

        let requests = txn.scan::<ReservationRequest>().unwrap();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert!(request.reserved);
            assert!(!request.planned);
            assert_eq!(request.purpose, Purpose::unpack());
            assert_eq!(reservations_of(&txn, request.id).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_concurrent_purchases_of_same_product_conflict() {
        let store = seeded();
        let mut first = store.begin();
        let mut second = store.begin();
        assert!(purchase_one(&mut first, 1).unwrap().is_some());
        first.commit().unwrap();

        // Second snapshot still sees the product as missing
        let result = purchase_one(&mut second, 1);
        let conflict = match result {
            Err(e) => e.is_transient(),
            Ok(_) => second.commit().is_err(),
        };
        assert!(conflict);
    }

    // ==================== Arrival Tests ====================

    #[test]
    fn test_arrivals_wait_for_their_timeslice() {
        let store = seeded();
        let runner = runner(&store);
        let seller = Seller::new(SeedConfig::small().products(), 0, 1);
        seller.purchase(&runner, 1).unwrap();

        assert_eq!(seller.process_arrivals(&runner, 2).unwrap(), 0);
        assert_eq!(seller.process_arrivals(&runner, 3).unwrap(), 2);

        let txn = store.begin();
        assert!(txn
            .select::<Operation>(|op| op.kind.is_origin() && op.is_planned())
            .unwrap()
            .is_empty());
    }

    // ==================== Sale Tests ====================

    #[test]
    fn test_begin_timeslice_records_sales() {
        let store = seeded();
        let runner = runner(&store);
        let mut seller = Seller::new(SeedConfig::small().products(), 3, 7);

        seller.begin_timeslice(&runner, 1).unwrap();

        let txn = store.begin();
        assert_eq!(txn.scan::<Sale>().unwrap().len(), 3);
        assert_eq!(runner.metrics().counter(names::SALES), 3);
        // Two purchases plus three sales
        assert_eq!(txn.scan::<ReservationRequest>().unwrap().len(), 5);
    }

    #[test]
    fn test_no_products_no_sales() {
        let store = seeded();
        let runner = runner(&store);
        let mut seller = Seller::new(Vec::new(), 3, 7);
        seller.begin_timeslice(&runner, 1).unwrap();
        assert!(store.begin().scan::<Sale>().unwrap().is_empty());
    }
}
