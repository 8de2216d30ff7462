//! Customer sales
//!
//! A sale lists products and quantities; recording one files a reservation
//! request that the planner later turns into departures.

use crate::error::{DomainError, DomainResult};
use crate::goods::GoodsType;
use crate::ids::{RequestId, SaleId};
use crate::reservation::{insert_request, insert_request_item, Purpose};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use wms_store::{Record, TableName, Transaction};

/// A customer order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sale {
    /// Sale id
    pub id: SaleId,
    /// Product code to quantity
    pub contents: BTreeMap<String, u32>,
}

impl Record for Sale {
    const TABLE: TableName = "sale";
    type Id = SaleId;

    fn id(&self) -> SaleId {
        self.id
    }
}

/// Record a sale and file the matching reservation request
pub fn create_sale(
    txn: &mut Transaction,
    contents: BTreeMap<String, u32>,
) -> DomainResult<(Sale, RequestId)> {
    if contents.is_empty() {
        return Err(DomainError::InvalidPlan("empty sale".to_string()));
    }
    let sale = Sale {
        id: txn.allocate::<Sale>(),
        contents,
    };
    txn.insert(sale.clone())?;

    let request = insert_request(txn, Purpose::sale(sale.id), false)?;
    for (product, quantity) in &sale.contents {
        // Sellable goods type: the one carrying the product code as its own code
        let goods_type = txn
            .select::<GoodsType>(|t| t.code == *product && t.unpack.is_none())?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::UnknownGoodsType(product.clone()))?;
        insert_request_item(txn, request.id, goods_type.id, *quantity)?;
    }
    tracing::debug!(sale = %sale.id, request = %request.id, lines = sale.contents.len(), "recorded sale");
    Ok((sale, request.id))
}

/// Record a sale of one to three random products, one to five units each
pub fn create_random_sale<G: Rng>(
    txn: &mut Transaction,
    rng: &mut G,
    products: &[String],
) -> DomainResult<(Sale, RequestId)> {
    let lines = rng.gen_range(1..=3).min(products.len());
    let picked: Vec<String> = products.choose_multiple(rng, lines).cloned().collect();
    let contents = picked
        .into_iter()
        .map(|p| (p, rng.gen_range(1..=5)))
        .collect();
    create_sale(txn, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{items_of, ReservationRequest};
    use crate::seed::{install, SeedConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use wms_store::Store;

    fn seeded() -> Store {
        let store = Store::new();
        install(&store, &SeedConfig::small()).unwrap();
        store
    }

    #[test]
    fn test_create_sale_files_request() {
        let store = seeded();
        let mut txn = store.begin();
        let contents = BTreeMap::from([("JEANS/25/20".to_string(), 2)]);
        let (sale, request) = create_sale(&mut txn, contents).unwrap();

        let req = txn.fetch::<ReservationRequest>(request).unwrap();
        assert_eq!(req.purpose, Purpose::sale(sale.id));
        let items = items_of(&txn, request).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn test_create_sale_rejects_unknown_product() {
        let store = seeded();
        let mut txn = store.begin();
        let contents = BTreeMap::from([("SHIRT/M".to_string(), 1)]);
        assert!(matches!(
            create_sale(&mut txn, contents),
            Err(DomainError::UnknownGoodsType(_))
        ));
        assert!(matches!(
            create_sale(&mut txn, BTreeMap::new()),
            Err(DomainError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_random_sale_uses_known_products() {
        let store = seeded();
        let products = SeedConfig::small().products();
        let mut rng = StdRng::seed_from_u64(7);
        let mut txn = store.begin();
        for _ in 0..10 {
            let (sale, _) = create_random_sale(&mut txn, &mut rng, &products).unwrap();
            assert!((1..=3).contains(&sale.contents.len()));
            for (product, qty) in &sale.contents {
                assert!(products.contains(product));
                assert!((1..=5).contains(qty));
            }
        }
    }
}
