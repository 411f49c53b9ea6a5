use std::fmt::Display;

use serde::{Deserialize, Serialize};
use settlement_common::Kobo;
use thiserror::Error;

use crate::{
    db_types::{OrderId, ShippingAddress},
    ErrorKind,
};

/// The gateway's interpretation of a transaction's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Successful,
    Pending,
    Failed,
    Cancelled,
}

impl GatewayStatus {
    /// Maps the gateway's free-form status string. Anything unrecognised is a failure, never a success.
    pub fn from_gateway(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "successful" | "completed" | "success" => GatewayStatus::Successful,
            "pending" => GatewayStatus::Pending,
            "cancelled" | "canceled" | "abandoned" | "expired" => GatewayStatus::Cancelled,
            _ => GatewayStatus::Failed,
        }
    }
}

impl Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Successful => write!(f, "successful"),
            GatewayStatus::Pending => write!(f, "pending"),
            GatewayStatus::Failed => write!(f, "failed"),
            GatewayStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The authoritative record of a transaction, as returned by the gateway's verification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub transaction_id: String,
    /// The raw status string reported by the gateway
    pub status: String,
    pub tx_ref: Option<String>,
    pub amount: Option<Kobo>,
    pub currency: Option<String>,
    /// The order id we put in the payment metadata when initializing the payment
    pub order_id: Option<OrderId>,
}

impl GatewayTransaction {
    pub fn gateway_status(&self) -> GatewayStatus {
        GatewayStatus::from_gateway(&self.status)
    }
}

/// Everything the gateway needs to start collecting a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub tx_ref: String,
    pub order_id: OrderId,
    pub amount: Kobo,
    pub currency: String,
    pub buyer_id: String,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub redirect_link: String,
}

/// The payment gateway collaborator. Calls are made strictly outside database transactions.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn verify_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, GatewayError>;

    async fn initialize_payment(&self, intent: &PaymentIntent) -> Result<PaymentLink, GatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Could not reach the payment gateway: {0}")]
    Unreachable(String),
    #[error("The payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("The payment gateway returned a response we could not understand: {0}")]
    InvalidResponse(String),
    #[error("Transaction {0} is unknown to the payment gateway")]
    TransactionNotFound(String),
    #[error("The payment gateway is not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Unreachable(_) | GatewayError::InvalidResponse(_) => ErrorKind::Transient,
            GatewayError::Rejected(_) => ErrorKind::Validation,
            GatewayError::TransactionNotFound(_) => ErrorKind::NotFound,
            GatewayError::NotConfigured(_) => ErrorKind::InvariantViolation,
        }
    }
}
