use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use settlement_common::Kobo;
use settlement_engine::{
    db_types::{DeliveryStatus, FundRelease, WalletTransaction},
    traits::DeliveryUpdate,
    PaymentReference,
};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatusUpdate {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub delivery_date: Option<DateTime<Utc>>,
}

impl From<DeliveryStatusUpdate> for DeliveryUpdate {
    fn from(value: DeliveryStatusUpdate) -> Self {
        DeliveryUpdate { status: value.status, delivery_date: value.delivery_date }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmDeliveryRequest {
    pub buyer_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub note: String,
}

/// Amounts are accepted either as a whole number of kobo or as a decimal string in naira ("1500.50").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: Kobo,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Kobo(i64),
    Naira(String),
}

fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Kobo, D::Error> {
    match AmountRepr::deserialize(deserializer)? {
        AmountRepr::Kobo(k) => Ok(Kobo::from(k)),
        AmountRepr::Naira(s) => s.parse::<Kobo>().map_err(serde::de::Error::custom),
    }
}

/// A client-initiated verification. A transaction id is preferred; a bare tx_ref means the buyer never paid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub transaction_id: Option<String>,
    pub tx_ref: Option<String>,
}

impl VerifyPaymentRequest {
    pub fn reference(self) -> Result<PaymentReference, ServerError> {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        match (non_empty(self.transaction_id), non_empty(self.tx_ref)) {
            (Some(id), _) => Ok(PaymentReference::TransactionId(id)),
            (None, Some(tx_ref)) => Ok(PaymentReference::TxRef(tx_ref)),
            (None, None) => {
                Err(ServerError::InvalidRequestBody("Either transaction_id or tx_ref must be provided".into()))
            },
        }
    }
}

/// Query parameters of the gateway's redirect back to us. The gateway also sends a `status`, which we ignore: the
/// gateway's verification call is the only source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSuccessParams {
    pub tx_ref: String,
    pub transaction_id: Option<String>,
}

/// The parts of a gateway webhook we care about. Everything else in the payload is untrusted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: Option<String>,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(deserialize_with = "deserialize_transaction_id")]
    pub id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TransactionIdRepr {
    Number(u64),
    Text(String),
}

fn deserialize_transaction_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match TransactionIdRepr::deserialize(deserializer)? {
        TransactionIdRepr::Number(n) => n.to_string(),
        TransactionIdRepr::Text(s) => s,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalResult {
    pub release: FundRelease,
    pub debit: WalletTransaction,
}
