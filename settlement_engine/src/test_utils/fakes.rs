use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use settlement_common::Kobo;

use crate::{
    db_types::{ShippingMethod, StoreId},
    traits::{
        Catalog,
        CatalogError,
        GatewayError,
        GatewayTransaction,
        PaymentGateway,
        PaymentIntent,
        PaymentLink,
        ProductSnapshot,
    },
};

/// An in-memory catalog. Clones share the same products, so a test can change a price after handing the catalog to
/// an API.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: Arc<Mutex<HashMap<String, ProductSnapshot>>>,
    shipping: Arc<Mutex<HashMap<StoreId, Vec<ShippingMethod>>>>,
}

impl StaticCatalog {
    pub fn with_product(self, product_id: &str, store_id: &str, price: i64, stock: i64) -> Self {
        self.upsert(ProductSnapshot {
            product_id: product_id.to_string(),
            store_id: StoreId::from(store_id),
            price: Kobo::from(price),
            stock,
            available: true,
            is_physical: true,
        });
        self
    }

    pub fn with_shipping_method(self, store_id: &str, method_id: &str, cost: i64) -> Self {
        let method = ShippingMethod {
            id: method_id.to_string(),
            name: format!("{method_id} shipping"),
            cost: Kobo::from(cost),
            estimated_days: Some(3),
        };
        if let Ok(mut shipping) = self.shipping.lock() {
            shipping.entry(StoreId::from(store_id)).or_default().push(method);
        }
        self
    }

    pub fn upsert(&self, product: ProductSnapshot) {
        if let Ok(mut products) = self.products.lock() {
            products.insert(product.product_id.clone(), product);
        }
    }

    pub fn update<F: FnOnce(&mut ProductSnapshot)>(&self, product_id: &str, f: F) {
        if let Ok(mut products) = self.products.lock() {
            if let Some(p) = products.get_mut(product_id) {
                f(p);
            }
        }
    }

    pub fn remove(&self, product_id: &str) {
        if let Ok(mut products) = self.products.lock() {
            products.remove(product_id);
        }
    }
}

impl Catalog for StaticCatalog {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<ProductSnapshot>, CatalogError> {
        let products = self.products.lock().map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(products.get(product_id).cloned())
    }

    async fn shipping_methods(&self, store_id: &StoreId) -> Result<Vec<ShippingMethod>, CatalogError> {
        let shipping = self.shipping.lock().map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        Ok(shipping.get(store_id).cloned().unwrap_or_default())
    }
}

/// A payment gateway whose answers are set up by the test. Unknown transactions are reported as not found.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    transactions: Arc<Mutex<HashMap<String, GatewayTransaction>>>,
    intents: Arc<Mutex<Vec<PaymentIntent>>>,
    verify_calls: Arc<Mutex<usize>>,
    offline: Arc<Mutex<bool>>,
}

impl ScriptedGateway {
    pub fn set_transaction(&self, transaction: GatewayTransaction) {
        if let Ok(mut txs) = self.transactions.lock() {
            txs.insert(transaction.transaction_id.clone(), transaction);
        }
    }

    /// While offline, every call fails with [`GatewayError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut o) = self.offline.lock() {
            *o = offline;
        }
    }

    pub fn intents(&self) -> Vec<PaymentIntent> {
        self.intents.lock().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.lock().map(|c| *c).unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), GatewayError> {
        match self.offline.lock() {
            Ok(o) if !*o => Ok(()),
            _ => Err(GatewayError::Unreachable("gateway offline".into())),
        }
    }
}

impl PaymentGateway for ScriptedGateway {
    async fn verify_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, GatewayError> {
        if let Ok(mut calls) = self.verify_calls.lock() {
            *calls += 1;
        }
        self.check_online()?;
        let txs = self.transactions.lock().map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        txs.get(transaction_id).cloned().ok_or_else(|| GatewayError::TransactionNotFound(transaction_id.to_string()))
    }

    async fn initialize_payment(&self, intent: &PaymentIntent) -> Result<PaymentLink, GatewayError> {
        self.check_online()?;
        if let Ok(mut intents) = self.intents.lock() {
            intents.push(intent.clone());
        }
        Ok(PaymentLink { redirect_link: format!("https://checkout.example.com/pay/{}", intent.tx_ref) })
    }
}
