//! Record identifiers

use wms_store::define_id;

define_id!(
    /// Location identifier
    LocationId
);
define_id!(
    /// Goods type identifier
    GoodsTypeId
);
define_id!(
    /// Physical goods identifier
    GoodsId
);
define_id!(
    /// Avatar identifier
    AvatarId
);
define_id!(
    /// Operation identifier
    OperationId
);
define_id!(
    /// Reservation request identifier
    RequestId
);
define_id!(
    /// Reservation request item identifier
    RequestItemId
);
define_id!(
    /// Reservation identifier
    ReservationId
);
define_id!(
    /// Sale identifier
    SaleId
);
define_id!(
    /// Regular worker record identifier
    WorkerId
);
define_id!(
    /// Continuous worker record identifier
    ContinuousWorkerId
);
