//! A [`Catalog`] backed by the product service's REST API.
//!
//! * `GET {base}/products/{id}` returns a [`ProductSnapshot`], or 404 if the product has been removed.
//! * `GET {base}/stores/{id}/shipping_methods` returns the store's current [`ShippingMethod`]s.
//!
//! Any other failure makes the catalog [`CatalogError::Unavailable`], and the checkout that needed it is refused.
use std::sync::Arc;

use log::*;
use reqwest::{Client, StatusCode};
use settlement_engine::{
    db_types::{ShippingMethod, StoreId},
    traits::{Catalog, CatalogError, ProductSnapshot},
};

#[derive(Clone)]
pub struct HttpCatalog {
    base_url: String,
    client: Arc<Client>,
}

impl HttpCatalog {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(Client::new()) }
    }

    fn url(&self, path: &str) -> Result<String, CatalogError> {
        if self.base_url.is_empty() {
            return Err(CatalogError::Unavailable("No catalog URL has been configured".into()));
        }
        Ok(format!("{}{path}", self.base_url))
    }
}

impl Catalog for HttpCatalog {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>, CatalogError> {
        let url = self.url(&format!("/products/{product_id}"))?;
        trace!("🛒️ Fetching product {product_id} from the catalog");
        let response = self.client.get(url).send().await.map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let product = response
                    .json::<ProductSnapshot>()
                    .await
                    .map_err(|e| CatalogError::Unavailable(format!("Invalid product {product_id}. {e}")))?;
                Ok(Some(product))
            },
            s => Err(CatalogError::Unavailable(format!("Catalog returned {s} for product {product_id}"))),
        }
    }

    async fn shipping_methods(&self, store_id: &StoreId) -> Result<Vec<ShippingMethod>, CatalogError> {
        let url = self.url(&format!("/stores/{store_id}/shipping_methods"))?;
        trace!("🛒️ Fetching shipping methods for {store_id}");
        let response = self.client.get(url).send().await.map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            s if s.is_success() => response
                .json::<Vec<ShippingMethod>>()
                .await
                .map_err(|e| CatalogError::Unavailable(format!("Invalid shipping methods for {store_id}. {e}"))),
            s => Err(CatalogError::Unavailable(format!("Catalog returned {s} for store {store_id}"))),
        }
    }
}
