use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
};

use chrono::{DateTime, Duration, Utc};
use log::*;
use settlement_common::{Kobo, CURRENCY_CODE};

use crate::{
    db_types::{LineItem, NewOrder, NewSubOrder, ShippingMethod, StoreId},
    helpers::{generate_order_id, generate_tx_ref},
    settlement_api::{
        checkout_objects::{CartItem, CartValidation, CartValidationError, CheckoutRequest, CheckoutResult},
        errors::CheckoutError,
        shipping::{self, StoreShipping},
    },
    traits::{Catalog, CatalogError, OrderManagement, PaymentGateway, PaymentIntent, ProductSnapshot},
};

pub const DEFAULT_PLATFORM_FEE_BPS: i64 = 500;
pub const DEFAULT_PAYMENT_GRACE_MINS: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct CheckoutPolicy {
    /// The platform's cut of each sub-order's goods total, in basis points
    pub platform_fee_bps: i64,
    /// How long an unverified payment stays open before it is cancelled
    pub payment_grace: Duration,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            payment_grace: Duration::minutes(DEFAULT_PAYMENT_GRACE_MINS),
        }
    }
}

/// Checkout validation and submission.
///
/// The cart is always re-validated against the live catalog here, immediately before the order is written, no matter
/// how recently the buyer saw it.
pub struct CheckoutApi<B, C, G> {
    db: B,
    catalog: C,
    gateway: G,
    policy: CheckoutPolicy,
}

impl<B, C, G> Debug for CheckoutApi<B, C, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi ({:?})", self.policy)
    }
}

impl<B, C, G> CheckoutApi<B, C, G> {
    pub fn new(db: B, catalog: C, gateway: G) -> Self {
        Self { db, catalog, gateway, policy: CheckoutPolicy::default() }
    }

    pub fn with_policy(mut self, policy: CheckoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CheckoutPolicy {
        &self.policy
    }
}

impl<B, C, G> CheckoutApi<B, C, G>
where
    B: OrderManagement,
    C: Catalog,
    G: PaymentGateway,
{
    /// The Checkout Validator. Re-reads every product in the cart and reports each discrepancy. Nothing is written.
    pub async fn validate_cart(&self, items: &[CartItem]) -> Result<CartValidation, CheckoutError> {
        let (validation, _) = self.inspect_cart(items).await?;
        Ok(validation)
    }

    async fn inspect_cart(
        &self,
        items: &[CartItem],
    ) -> Result<(CartValidation, HashMap<String, ProductSnapshot>), CatalogError> {
        let mut errors = Vec::new();
        let mut products = HashMap::new();
        let mut requested = HashMap::<&str, i64>::new();
        for item in items {
            if item.quantity <= 0 {
                errors.push(CartValidationError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
                continue;
            }
            let total = requested.entry(item.product_id.as_str()).or_default();
            match total.checked_add(item.quantity) {
                Some(sum) => *total = sum,
                None => {
                    errors.push(CartValidationError::InvalidQuantity {
                        product_id: item.product_id.clone(),
                        quantity: item.quantity,
                    });
                    continue;
                },
            }
            if products.contains_key(&item.product_id) {
                continue;
            }
            match self.catalog.fetch_product(&item.product_id).await? {
                Some(product) => {
                    products.insert(item.product_id.clone(), product);
                },
                None => errors.push(CartValidationError::ProductNotFound { product_id: item.product_id.clone() }),
            }
        }
        for item in items.iter().filter(|i| i.quantity > 0) {
            let Some(product) = products.get(&item.product_id) else { continue };
            let product_id = item.product_id.clone();
            if product.store_id != item.store_id {
                errors.push(CartValidationError::StoreMismatch {
                    product_id,
                    expected: item.store_id.clone(),
                    actual: product.store_id.clone(),
                });
            } else if !product.available {
                errors.push(CartValidationError::ProductUnavailable { product_id });
            } else if product.price != item.unit_price {
                errors.push(CartValidationError::PriceChanged {
                    product_id,
                    expected: item.unit_price,
                    current: product.price,
                });
            }
        }
        // Stock is checked against the total quantity of each product across all its lines
        let mut stock_checked = requested.keys().copied().collect::<Vec<_>>();
        stock_checked.sort_unstable();
        for product_id in stock_checked {
            let Some(product) = products.get(product_id) else { continue };
            let wanted = requested[product_id];
            if product.available && product.stock < wanted {
                errors.push(CartValidationError::InsufficientStock {
                    product_id: product_id.to_string(),
                    available: product.stock,
                    requested: wanted,
                });
            }
        }
        Ok((CartValidation::from_errors(errors), products))
    }

    /// Validates the cart, prices shipping, and saves the order with one held sub-order per store. Only after the
    /// order has been committed is the gateway asked for a payment link.
    pub async fn submit_checkout(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResult, CheckoutError> {
        if request.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let (validation, products) = self.inspect_cart(&request.items).await?;
        if !validation.is_valid {
            debug!("🛒️ Checkout for {} rejected: {} cart errors", request.buyer_id, validation.validation_errors.len());
            return Err(CheckoutError::InvalidCart(validation.validation_errors));
        }
        let mut by_store = BTreeMap::<StoreId, Vec<&CartItem>>::new();
        for item in &request.items {
            by_store.entry(item.store_id.clone()).or_default().push(item);
        }
        let mut stores = Vec::with_capacity(by_store.len());
        for (store_id, items) in &by_store {
            let methods = self.catalog.shipping_methods(store_id).await?;
            let has_physical_items = items.iter().any(|i| products.get(&i.product_id).is_some_and(|p| p.is_physical));
            stores.push(StoreShipping { store_id: store_id.clone(), has_physical_items, methods });
        }
        let quote = shipping::aggregate(&stores, &request.shipping_selections)?;

        let mut sub_orders = Vec::with_capacity(by_store.len());
        for (store_id, items) in by_store {
            let shipping_method = quote.method_for(&store_id).cloned();
            let shipping_cost = quote.cost_for(&store_id);
            sub_orders.push(self.build_sub_order(store_id, &items, shipping_method, shipping_cost)?);
        }
        let order_id = generate_order_id(now);
        let tx_ref = generate_tx_ref(&order_id);
        let new_order = NewOrder {
            order_id,
            buyer_id: request.buyer_id,
            tx_ref,
            shipping_address: request.shipping_address,
            expires_at: now + self.policy.payment_grace,
            sub_orders,
        };
        if new_order.total_amount().is_none() {
            return Err(CheckoutError::InvalidAmount("The order total is too large".into()));
        }
        let (order, sub_orders) = self.db.insert_order(new_order, now).await?;
        info!(
            "🛒️ Order {} created for {}. {} due over {} stores",
            order.order_id,
            order.buyer_id,
            order.total_amount,
            sub_orders.len()
        );

        let intent = PaymentIntent {
            tx_ref: order.tx_ref.clone(),
            order_id: order.order_id.clone(),
            amount: order.total_amount,
            currency: CURRENCY_CODE.to_string(),
            buyer_id: order.buyer_id.clone(),
            shipping_address: order.shipping_address.0.clone(),
        };
        let link = self.gateway.initialize_payment(&intent).await.map_err(|e| {
            warn!(
                "🛒️ Order {} was saved, but the payment could not be initialized: {e}. It will expire unpaid.",
                order.order_id
            );
            e
        })?;
        Ok(CheckoutResult { order, sub_orders, redirect_link: link.redirect_link })
    }

    fn build_sub_order(
        &self,
        store_id: StoreId,
        items: &[&CartItem],
        shipping_method: Option<ShippingMethod>,
        shipping_cost: Kobo,
    ) -> Result<NewSubOrder, CheckoutError> {
        let line_items = items
            .iter()
            .map(|i| LineItem {
                product_id: i.product_id.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
                size: i.size.clone(),
            })
            .collect::<Vec<_>>();
        let overflow = || CheckoutError::InvalidAmount(format!("The order total for {store_id} is too large"));
        let sub_total = line_items
            .iter()
            .try_fold(Kobo::default(), |acc, item| item.total().and_then(|t| acc.checked_add(t)))
            .ok_or_else(overflow)?;
        let platform_fee = sub_total.basis_points(self.policy.platform_fee_bps);
        let settlement_amount = sub_total
            .checked_add(shipping_cost)
            .and_then(|v| v.checked_sub(platform_fee))
            .ok_or_else(overflow)?;
        if !settlement_amount.is_positive() {
            return Err(CheckoutError::InvalidAmount(format!(
                "The settlement amount for {store_id} would be {settlement_amount}"
            )));
        }
        Ok(NewSubOrder { store_id, line_items, shipping_method, sub_total, shipping_cost, platform_fee, settlement_amount })
    }
}
