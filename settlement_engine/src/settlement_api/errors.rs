use settlement_common::Kobo;
use thiserror::Error;

use crate::{
    db_types::OrderId,
    settlement_api::{checkout_objects::CartValidationError, shipping::ShippingError},
    traits::{CatalogError, GatewayError, SettlementDbError},
    ErrorKind,
};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("The cart is empty")]
    EmptyCart,
    #[error("The cart failed validation with {} error(s)", .0.len())]
    InvalidCart(Vec<CartValidationError>),
    #[error("{0}")]
    Shipping(#[from] ShippingError),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{0}")]
    Catalog(#[from] CatalogError),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Database(#[from] SettlementDbError),
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::EmptyCart
            | CheckoutError::InvalidCart(_)
            | CheckoutError::Shipping(_)
            | CheckoutError::InvalidAmount(_) => ErrorKind::Validation,
            CheckoutError::Catalog(_) => ErrorKind::Transient,
            CheckoutError::Gateway(e) => e.kind(),
            CheckoutError::Database(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentVerificationError {
    #[error("A transaction id or tx_ref is required")]
    EmptyReference,
    #[error("Transaction {0} does not identify an order")]
    MissingOrderReference(String),
    #[error("No order matches {0}")]
    OrderNotFound(String),
    #[error("The gateway reports tx_ref {actual:?} but the order expects {expected}")]
    TxRefMismatch { expected: String, actual: Option<String> },
    #[error("Order {order_id} costs {expected}, but the gateway only collected {received:?}")]
    AmountMismatch { order_id: OrderId, expected: Kobo, received: Option<Kobo> },
    #[error("The payment was made in {0}, which is not accepted")]
    CurrencyMismatch(String),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Database(#[from] SettlementDbError),
}

impl PaymentVerificationError {
    pub fn kind(&self) -> ErrorKind {
        use PaymentVerificationError::*;
        match self {
            EmptyReference | MissingOrderReference(_) => ErrorKind::Validation,
            TxRefMismatch { .. } | AmountMismatch { .. } | CurrencyMismatch(_) => ErrorKind::Validation,
            OrderNotFound(_) => ErrorKind::NotFound,
            Gateway(e) => e.kind(),
            Database(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    #[error("Sub-order {0} does not exist")]
    SubOrderNotFound(i64),
    #[error("Sub-order {0} is not in the refund queue")]
    NotInRefundQueue(i64),
    #[error("A refund needs a reason")]
    MissingReason,
    #[error("{0}")]
    Database(#[from] SettlementDbError),
}

impl EscrowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EscrowError::SubOrderNotFound(_) => ErrorKind::NotFound,
            EscrowError::NotInRefundQueue(_) | EscrowError::MissingReason => ErrorKind::Validation,
            EscrowError::Database(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FundReleaseError {
    #[error("Fund release {0} does not exist")]
    NotFound(i64),
    #[error("{0}")]
    Database(#[from] SettlementDbError),
}

impl FundReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FundReleaseError::NotFound(_) => ErrorKind::NotFound,
            FundReleaseError::Database(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("The minimum withdrawal is {min}. {requested} was requested")]
    BelowMinimum { min: Kobo, requested: Kobo },
    #[error("The maximum withdrawal is {max}. {requested} was requested")]
    AboveMaximum { max: Kobo, requested: Kobo },
    #[error("The withdrawal fee of {fee} leaves nothing of {amount}")]
    FeeExceedsAmount { amount: Kobo, fee: Kobo },
    #[error("{0}")]
    Database(#[from] SettlementDbError),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::BelowMinimum { .. } | WalletError::AboveMaximum { .. } | WalletError::FeeExceedsAmount { .. } => {
                ErrorKind::Validation
            },
            WalletError::Database(e) => e.kind(),
        }
    }
}
