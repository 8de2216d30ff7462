//! Reference data for the bench warehouse

use crate::error::DomainResult;
use crate::goods::{location_by_code, GoodsType, Location, UnpackBehaviour};
use serde::Deserialize;
use wms_store::Store;

/// Product grid and packaging of the seeded catalogue
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Jeans widths
    pub widths: Vec<u32>,
    /// Jeans heights
    pub heights: Vec<u32>,
    /// Units in one pack
    pub units_per_pack: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            widths: (25..45).collect(),
            heights: (20..40).collect(),
            units_per_pack: 20,
        }
    }
}

impl SeedConfig {
    /// A two-product catalogue, for tests
    pub fn small() -> Self {
        Self {
            widths: vec![25, 26],
            heights: vec![20],
            units_per_pack: 4,
        }
    }

    /// Product codes of the grid, `JEANS/<width>/<height>`
    pub fn products(&self) -> Vec<String> {
        self.widths
            .iter()
            .flat_map(|w| self.heights.iter().map(move |h| format!("JEANS/{}/{}", w, h)))
            .collect()
    }
}

/// Pack goods type code for a product
pub fn pack_code(product: &str) -> String {
    format!("{}/PCK", product)
}

/// Install locations and goods types; no-op if already installed
pub fn install(store: &Store, config: &SeedConfig) -> DomainResult<()> {
    let mut txn = store.begin();
    if location_by_code(&txn, "incoming").is_ok() {
        tracing::debug!("seed data already present");
        return Ok(());
    }

    for code in ["incoming", "stock", "outgoing"] {
        let id = txn.allocate::<Location>();
        txn.insert(Location {
            id,
            code: code.to_string(),
        })?;
    }

    let products = config.products();
    for product in &products {
        let unit = txn.allocate::<GoodsType>();
        txn.insert(GoodsType {
            id: unit,
            code: product.clone(),
            product: Some(product.clone()),
            unpack: None,
        })?;
        let pack = txn.allocate::<GoodsType>();
        txn.insert(GoodsType {
            id: pack,
            code: pack_code(product),
            product: Some(product.clone()),
            unpack: Some(UnpackBehaviour {
                outcome_type: unit,
                quantity: config.units_per_pack,
            }),
        })?;
    }
    txn.commit()?;
    tracing::info!(products = products.len(), "installed seed data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goods::{goods_type_by_code, Locations};

    #[test]
    fn test_default_grid() {
        let config = SeedConfig::default();
        let products = config.products();
        assert_eq!(products.len(), 400);
        assert_eq!(products[0], "JEANS/25/20");
        assert_eq!(config.units_per_pack, 20);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SeedConfig = serde_json::from_str(r#"{"units_per_pack": 10}"#).unwrap();
        assert_eq!(config.units_per_pack, 10);
        assert_eq!(config.widths.len(), 20);
    }

    #[test]
    fn test_install_is_idempotent() {
        let store = Store::new();
        install(&store, &SeedConfig::small()).unwrap();
        install(&store, &SeedConfig::small()).unwrap();

        let txn = store.begin();
        Locations::resolve(&txn).unwrap();
        assert_eq!(txn.scan::<Location>().unwrap().len(), 3);
        assert_eq!(txn.scan::<GoodsType>().unwrap().len(), 4);

        let pack = goods_type_by_code(&txn, "JEANS/26/20/PCK").unwrap();
        let unit = goods_type_by_code(&txn, "JEANS/26/20").unwrap();
        assert_eq!(pack.unpack.unwrap().outcome_type, unit.id);
        assert_eq!(pack.product, unit.product);
    }
}
