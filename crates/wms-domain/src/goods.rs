//! Locations, goods types, goods and their avatars

use crate::error::{DomainError, DomainResult};
use crate::ids::{AvatarId, GoodsId, GoodsTypeId, LocationId, OperationId};
use chrono::{DateTime, Utc};
use wms_store::{Record, TableName, Transaction};

/// A place goods can be at
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// Location id
    pub id: LocationId,
    /// Unique code (`incoming`, `stock`, `outgoing`, ...)
    pub code: String,
}

impl Record for Location {
    const TABLE: TableName = "location";
    type Id = LocationId;

    fn id(&self) -> LocationId {
        self.id
    }
}

/// What unpacking one unit of a goods type yields
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnpackBehaviour {
    /// Type of each outcome
    pub outcome_type: GoodsTypeId,
    /// Number of outcomes per unpacked unit
    pub quantity: u32,
}

/// Kind of goods
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoodsType {
    /// Goods type id
    pub id: GoodsTypeId,
    /// Unique code
    pub code: String,
    /// Product reference shared between sellable goods and their packs
    pub product: Option<String>,
    /// Set for packs that can be unpacked
    pub unpack: Option<UnpackBehaviour>,
}

impl Record for GoodsType {
    const TABLE: TableName = "goods_type";
    type Id = GoodsTypeId;

    fn id(&self) -> GoodsTypeId {
        self.id
    }
}

/// One physical item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Goods {
    /// Goods id
    pub id: GoodsId,
    /// Its type
    pub goods_type: GoodsTypeId,
}

impl Record for Goods {
    const TABLE: TableName = "goods";
    type Id = GoodsId;

    fn id(&self) -> GoodsId {
        self.id
    }
}

/// Avatar lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AvatarState {
    /// Planned to exist once its creating operation runs
    Future,
    /// Physically there now
    Present,
    /// Consumed by an executed operation
    Past,
}

/// Time-boxed presence of goods at a location
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Avatar {
    /// Avatar id
    pub id: AvatarId,
    /// Goods it represents
    pub goods: GoodsId,
    /// Where the goods is
    pub location: LocationId,
    /// Lifecycle state
    pub state: AvatarState,
    /// Start of validity
    pub dt_from: DateTime<Utc>,
    /// End of validity, `None` while open-ended
    pub dt_until: Option<DateTime<Utc>>,
    /// Operation that produced this avatar
    pub reason: OperationId,
}

impl Avatar {
    /// Physically there: usable as an operation input right now
    ///
    /// Planning may already have bounded `dt_until`, so it is not checked.
    pub fn is_available(&self) -> bool {
        self.state == AvatarState::Present
    }

    /// Open-ended and not consumed: the goods' latest known whereabouts
    pub fn is_current(&self) -> bool {
        self.dt_until.is_none() && self.state != AvatarState::Past
    }
}

impl Record for Avatar {
    const TABLE: TableName = "avatar";
    type Id = AvatarId;

    fn id(&self) -> AvatarId {
        self.id
    }
}

/// Well-known locations of the bench warehouse, resolved once per worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Locations {
    /// Where arrivals land
    pub incoming: LocationId,
    /// Where unpacked goods are stored
    pub stock: LocationId,
    /// Where departures leave from
    pub outgoing: LocationId,
}

impl Locations {
    /// Resolve the three bench locations by code
    pub fn resolve(txn: &Transaction) -> DomainResult<Self> {
        Ok(Self {
            incoming: location_by_code(txn, "incoming")?.id,
            stock: location_by_code(txn, "stock")?.id,
            outgoing: location_by_code(txn, "outgoing")?.id,
        })
    }
}

/// Find a location by code
pub fn location_by_code(txn: &Transaction, code: &str) -> DomainResult<Location> {
    txn.select::<Location>(|l| l.code == code)?
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::UnknownLocation(code.to_string()))
}

/// Find a goods type by code
pub fn goods_type_by_code(txn: &Transaction, code: &str) -> DomainResult<GoodsType> {
    txn.select::<GoodsType>(|t| t.code == code)?
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::UnknownGoodsType(code.to_string()))
}

/// The open-ended, non-consumed avatar of a goods, if any
pub fn current_avatar(txn: &Transaction, goods: GoodsId) -> DomainResult<Option<Avatar>> {
    Ok(txn
        .select::<Avatar>(|a| a.goods == goods && a.is_current())?
        .into_iter()
        .next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wms_store::Store;

    fn avatar(state: AvatarState, dt_until: Option<DateTime<Utc>>) -> Avatar {
        Avatar {
            id: AvatarId::new(1),
            goods: GoodsId::new(1),
            location: LocationId::new(1),
            state,
            dt_from: Utc::now(),
            dt_until,
            reason: OperationId::new(1),
        }
    }

    #[test]
    fn test_avatar_availability() {
        assert!(avatar(AvatarState::Present, None).is_available());
        assert!(!avatar(AvatarState::Future, None).is_available());
        assert!(avatar(AvatarState::Present, Some(Utc::now())).is_available());
        assert!(!avatar(AvatarState::Past, Some(Utc::now())).is_available());

        assert!(avatar(AvatarState::Future, None).is_current());
        assert!(!avatar(AvatarState::Past, None).is_current());
    }

    #[test]
    fn test_lookup_by_code() {
        let store = Store::new();
        let mut txn = store.begin();
        let id = txn.allocate::<Location>();
        txn.insert(Location { id, code: "stock".into() }).unwrap();

        assert_eq!(location_by_code(&txn, "stock").unwrap().id, id);
        assert!(matches!(
            location_by_code(&txn, "attic"),
            Err(DomainError::UnknownLocation(_))
        ));
        assert!(matches!(
            goods_type_by_code(&txn, "JEANS/30/30"),
            Err(DomainError::UnknownGoodsType(_))
        ));
    }
}
