//! Reservation requests and their fulfilment
//!
//! A request asks for quantities of goods types for some purpose. The
//! reserver binds concrete goods to it; the planner then turns the
//! reserved request into operations.

use crate::error::DomainResult;
use crate::goods::{current_avatar, Goods};
use crate::ids::{GoodsId, GoodsTypeId, RequestId, RequestItemId, ReservationId, SaleId};
use std::collections::HashSet;
use wms_store::{Record, Store, StoreError, TableName, Transaction};

/// Why goods are reserved
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Plain label
    Label(String),
    /// Label with a reference to another record
    LabelWithRef(String, u64),
}

impl Purpose {
    /// Unpack newly arrived packs
    pub fn unpack() -> Self {
        Purpose::Label("unpack".to_string())
    }

    /// Deliver a sale
    pub fn sale(id: SaleId) -> Self {
        Purpose::LabelWithRef("sale".to_string(), id.as_u64())
    }

    /// The label part
    pub fn label(&self) -> &str {
        match self {
            Purpose::Label(label) | Purpose::LabelWithRef(label, _) => label,
        }
    }
}

/// A request for goods
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Request id
    pub id: RequestId,
    /// What the goods are for
    pub purpose: Purpose,
    /// All items are bound to goods
    pub reserved: bool,
    /// Operations were planned from it
    pub planned: bool,
}

impl Record for ReservationRequest {
    const TABLE: TableName = "reservation_request";
    type Id = RequestId;

    fn id(&self) -> RequestId {
        self.id
    }
}

/// One line of a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRequestItem {
    /// Item id
    pub id: RequestItemId,
    /// Owning request
    pub request: RequestId,
    /// Requested goods type
    pub goods_type: GoodsTypeId,
    /// Number of goods requested
    pub quantity: u32,
}

impl Record for ReservationRequestItem {
    const TABLE: TableName = "reservation_request_item";
    type Id = RequestItemId;

    fn id(&self) -> RequestItemId {
        self.id
    }
}

/// Goods bound to a request item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// Reservation id
    pub id: ReservationId,
    /// Reserved goods
    pub goods: GoodsId,
    /// Item it fulfils
    pub request_item: RequestItemId,
    /// Always 1 for unit goods
    pub quantity: u32,
}

impl Record for Reservation {
    const TABLE: TableName = "reservation";
    type Id = ReservationId;

    fn id(&self) -> ReservationId {
        self.id
    }
}

/// Create a request without items
///
/// `reserved` is normally false; callers that bind goods themselves through
/// [`insert_reservation`] create it already reserved.
pub fn insert_request(
    txn: &mut Transaction,
    purpose: Purpose,
    reserved: bool,
) -> DomainResult<ReservationRequest> {
    let request = ReservationRequest {
        id: txn.allocate::<ReservationRequest>(),
        purpose,
        reserved,
        planned: false,
    };
    txn.insert(request.clone())?;
    Ok(request)
}

/// Add an item to a request
pub fn insert_request_item(
    txn: &mut Transaction,
    request: RequestId,
    goods_type: GoodsTypeId,
    quantity: u32,
) -> DomainResult<ReservationRequestItem> {
    let item = ReservationRequestItem {
        id: txn.allocate::<ReservationRequestItem>(),
        request,
        goods_type,
        quantity,
    };
    txn.insert(item.clone())?;
    Ok(item)
}

/// Bind one goods to a request item
pub fn insert_reservation(
    txn: &mut Transaction,
    goods: GoodsId,
    request_item: RequestItemId,
) -> DomainResult<Reservation> {
    let reservation = Reservation {
        id: txn.allocate::<Reservation>(),
        goods,
        request_item,
        quantity: 1,
    };
    txn.insert(reservation.clone())?;
    Ok(reservation)
}

/// Items of a request, ordered by id
pub fn items_of(txn: &Transaction, request: RequestId) -> DomainResult<Vec<ReservationRequestItem>> {
    Ok(txn.select::<ReservationRequestItem>(|i| i.request == request)?)
}

/// Reservations bound to a request, ordered by id
pub fn reservations_of(txn: &Transaction, request: RequestId) -> DomainResult<Vec<Reservation>> {
    let items: HashSet<RequestItemId> = items_of(txn, request)?.iter().map(|i| i.id).collect();
    Ok(txn.select::<Reservation>(|r| items.contains(&r.request_item))?)
}

/// Try to fully reserve one unreserved request
///
/// Requests and goods are picked skip-locked: a request another reserver
/// is working on, or goods another reserver is binding, are passed over.
/// A request is only marked reserved when every item is satisfied; partial
/// bindings are never written. Returns the reserved request, if any.
pub fn reserve_one(txn: &mut Transaction) -> DomainResult<Option<RequestId>> {
    let pending = txn.select::<ReservationRequest>(|r| !r.reserved)?;
    let taken: HashSet<GoodsId> = txn.scan::<Reservation>()?.iter().map(|r| r.goods).collect();

    for mut request in pending {
        if !txn.try_lock::<ReservationRequest>(request.id)? {
            continue;
        }
        let Some(bindings) = bind_items(txn, request.id, &taken)? else {
            continue;
        };
        for (item, goods) in bindings {
            // Rewriting the goods row makes a binding committed after our
            // snapshot surface as a conflict instead of a double reservation.
            txn.update(&goods)?;
            insert_reservation(txn, goods.id, item)?;
        }
        request.reserved = true;
        txn.update(&request)?;
        tracing::debug!(request = %request.id, purpose = request.purpose.label(), "reserved request");
        return Ok(Some(request.id));
    }
    Ok(None)
}

/// Pick goods for every item of a request, or `None` if short
fn bind_items(
    txn: &mut Transaction,
    request: RequestId,
    taken: &HashSet<GoodsId>,
) -> DomainResult<Option<Vec<(RequestItemId, Goods)>>> {
    let mut bindings = Vec::new();
    let mut chosen: HashSet<GoodsId> = HashSet::new();

    for item in items_of(txn, request)? {
        let candidates = txn.select::<Goods>(|g| {
            g.goods_type == item.goods_type && !taken.contains(&g.id) && !chosen.contains(&g.id)
        })?;
        let mut found = 0;
        for goods in candidates {
            if found == item.quantity {
                break;
            }
            if current_avatar(txn, goods.id)?.is_none() {
                continue;
            }
            if !txn.try_lock::<Goods>(goods.id)? {
                continue;
            }
            chosen.insert(goods.id);
            bindings.push((item.id, goods));
            found += 1;
        }
        if found < item.quantity {
            return Ok(None);
        }
    }
    Ok(Some(bindings))
}

/// Reserve up to `batch` requests, one transaction each
///
/// Conflicting attempts are rolled back and skipped. Returns how many
/// requests were reserved.
pub fn reserve_all(store: &Store, batch: usize) -> DomainResult<usize> {
    let mut reserved = 0;
    for _ in 0..batch {
        let mut txn = store.begin();
        match reserve_one(&mut txn) {
            Ok(Some(_)) => match txn.commit() {
                Ok(_) => reserved += 1,
                Err(StoreError::SerializationConflict(key)) => {
                    tracing::debug!(%key, "reservation commit conflict");
                }
                Err(e) => return Err(e.into()),
            },
            Ok(None) => {
                txn.rollback();
                break;
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "reservation conflict");
                txn.rollback();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(reserved)
}
