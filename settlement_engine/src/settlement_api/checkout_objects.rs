use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};
use settlement_common::Kobo;

use crate::db_types::{Order, ShippingAddress, StoreId, SubOrder};

/// One line of the buyer's cart, as the buyer saw it when they pressed "checkout".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub store_id: StoreId,
    pub quantity: i64,
    /// The price shown to the buyer. Checked against the catalog before any money moves.
    pub unit_price: Kobo,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub buyer_id: String,
    pub items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    /// Store id to the id of the shipping method the buyer picked for that store.
    #[serde(default)]
    pub shipping_selections: BTreeMap<StoreId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CartValidationError {
    InvalidQuantity { product_id: String, quantity: i64 },
    ProductNotFound { product_id: String },
    ProductUnavailable { product_id: String },
    InsufficientStock { product_id: String, available: i64, requested: i64 },
    PriceChanged { product_id: String, expected: Kobo, current: Kobo },
    StoreMismatch { product_id: String, expected: StoreId, actual: StoreId },
}

impl Display for CartValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CartValidationError::*;
        match self {
            InvalidQuantity { product_id, quantity } => write!(f, "{product_id}: {quantity} is not a valid quantity"),
            ProductNotFound { product_id } => write!(f, "{product_id} no longer exists"),
            ProductUnavailable { product_id } => write!(f, "{product_id} is not available"),
            InsufficientStock { product_id, available, requested } => {
                write!(f, "{product_id}: only {available} in stock, {requested} requested")
            },
            PriceChanged { product_id, expected, current } => {
                write!(f, "{product_id}: price changed from {expected} to {current}")
            },
            StoreMismatch { product_id, expected, actual } => {
                write!(f, "{product_id} is sold by {actual}, not {expected}")
            },
        }
    }
}

/// The Checkout Validator's verdict. `is_valid` is true exactly when `validation_errors` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartValidation {
    pub is_valid: bool,
    pub validation_errors: Vec<CartValidationError>,
}

impl CartValidation {
    pub fn from_errors(validation_errors: Vec<CartValidationError>) -> Self {
        Self { is_valid: validation_errors.is_empty(), validation_errors }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub order: Order,
    pub sub_orders: Vec<SubOrder>,
    pub redirect_link: String,
}
