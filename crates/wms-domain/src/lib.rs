//! # wms-domain
//!
//! Warehouse model consumed by the scheduler: goods and their avatars,
//! operations forming a dependency graph, reservation requests, sales and the
//! worker liveness registry.
//!
//! Everything here runs inside a caller-provided [`wms_store::Transaction`];
//! nothing commits on its own except [`reservation::reserve_all`] and
//! [`seed::install`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod goods;
pub mod ids;
pub mod operation;
pub mod reservation;
pub mod sale;
pub mod seed;
pub mod stock;
pub mod workers;

pub use error::{DomainError, DomainResult};
pub use goods::{Avatar, AvatarState, Goods, GoodsType, Location, Locations, UnpackBehaviour};
pub use ids::{
    AvatarId, ContinuousWorkerId, GoodsId, GoodsTypeId, LocationId, OperationId, RequestId,
    RequestItemId, ReservationId, SaleId, WorkerId,
};
pub use operation::{Operation, OperationKind, OperationState};
pub use reservation::{Purpose, Reservation, ReservationRequest, ReservationRequestItem};
pub use sale::Sale;
pub use seed::SeedConfig;
pub use workers::{ContinuousKind, ContinuousWorkerRecord, RegularWorkerRecord};
