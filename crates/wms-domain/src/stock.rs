//! Stock level queries

use crate::error::DomainResult;
use crate::goods::{Avatar, Goods, GoodsType};
use crate::ids::{GoodsId, GoodsTypeId};
use std::collections::{BTreeMap, HashMap};
use wms_store::Transaction;

/// Products with no goods on hand or on the way
///
/// A product counts as stocked as long as one goods of any of its types
/// (units or packs) has a current `Present` or `Future` avatar. Products are
/// returned in code order, at most `limit` of them.
pub fn missing_products(txn: &Transaction, limit: usize) -> DomainResult<Vec<String>> {
    let mut stocked: BTreeMap<String, usize> = BTreeMap::new();
    let mut product_of: HashMap<GoodsTypeId, String> = HashMap::new();
    for goods_type in txn.scan::<GoodsType>()? {
        if let Some(product) = goods_type.product {
            stocked.entry(product.clone()).or_insert(0);
            product_of.insert(goods_type.id, product);
        }
    }

    let type_of: HashMap<GoodsId, GoodsTypeId> = txn
        .scan::<Goods>()?
        .into_iter()
        .map(|g| (g.id, g.goods_type))
        .collect();

    for avatar in txn.select::<Avatar>(Avatar::is_current)? {
        let product = type_of
            .get(&avatar.goods)
            .and_then(|goods_type| product_of.get(goods_type));
        if let Some(count) = product.and_then(|p| stocked.get_mut(p)) {
            *count += 1;
        }
    }

    Ok(stocked
        .into_iter()
        .filter(|(_, count)| *count == 0)
        .map(|(product, _)| product)
        .take(limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goods::{goods_type_by_code, Locations};
    use crate::operation::{create_arrival, create_departure, execute};
    use crate::seed::{install, pack_code, SeedConfig};
    use chrono::Utc;
    use wms_store::Store;

    #[test]
    fn test_everything_missing_after_seed() {
        let store = Store::new();
        install(&store, &SeedConfig::small()).unwrap();
        let txn = store.begin();
        assert_eq!(
            missing_products(&txn, 10).unwrap(),
            vec!["JEANS/25/20".to_string(), "JEANS/26/20".to_string()]
        );
        assert_eq!(missing_products(&txn, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_planned_arrival_counts_as_stock() {
        let store = Store::new();
        install(&store, &SeedConfig::small()).unwrap();
        let mut txn = store.begin();
        let locations = Locations::resolve(&txn).unwrap();
        let pack = goods_type_by_code(&txn, &pack_code("JEANS/25/20")).unwrap();
        let arrival = create_arrival(&mut txn, pack.id, locations.incoming, 3, Utc::now()).unwrap();

        assert_eq!(missing_products(&txn, 10).unwrap(), vec!["JEANS/26/20".to_string()]);

        // Once the pack leaves, the product is missing again
        execute(&mut txn, arrival.id).unwrap();
        create_departure(&mut txn, arrival.outcomes[0], Utc::now(), None).unwrap();
        assert_eq!(missing_products(&txn, 10).unwrap().len(), 2);
    }
}
