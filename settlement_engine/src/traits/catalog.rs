use serde::{Deserialize, Serialize};
use settlement_common::Kobo;
use thiserror::Error;

use crate::db_types::{ShippingMethod, StoreId};

/// The current state of a product, as the catalog sees it right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: String,
    pub store_id: StoreId,
    pub price: Kobo,
    pub stock: i64,
    pub available: bool,
    /// Digital goods never need a shipping selection.
    pub is_physical: bool,
}

/// The product catalog collaborator. Read-only: the engine never reserves or decrements stock.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    /// Returns `None` if the product has been removed.
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>, CatalogError>;

    /// The shipping methods the store currently offers. Empty if it has none configured.
    async fn shipping_methods(&self, store_id: &StoreId) -> Result<Vec<ShippingMethod>, CatalogError>;
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("The catalog is unavailable: {0}")]
    Unavailable(String),
}
