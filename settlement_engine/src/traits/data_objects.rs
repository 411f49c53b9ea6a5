use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{DeliveryStatus, FundRelease, Order, OrderId, PaymentStatus, SubOrder, WalletTransaction};

/// How to find an order: by its id (as carried in the gateway's metadata), or by its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    OrderId(OrderId),
    TxRef(String),
}

impl Display for OrderLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderLookup::OrderId(id) => write!(f, "order {id}"),
            OrderLookup::TxRef(tx_ref) => write!(f, "tx_ref {tx_ref}"),
        }
    }
}

/// The result of a payment status update. `changed` is false when the order was already in a terminal status and
/// the update short-circuited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChange {
    pub order: Order,
    pub old_status: PaymentStatus,
    pub changed: bool,
}

impl PaymentStatusChange {
    pub fn unchanged(order: Order) -> Self {
        let old_status = order.payment_status;
        Self { order, old_status, changed: false }
    }

    pub fn changed(order: Order, old_status: PaymentStatus) -> Self {
        Self { order, old_status, changed: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    /// Only used when entering `Delivered`. Defaults to the time of the update.
    pub delivery_date: Option<DateTime<Utc>>,
}

impl DeliveryUpdate {
    pub fn new(status: DeliveryStatus) -> Self {
        Self { status, delivery_date: None }
    }

    pub fn delivered_at(date: DateTime<Utc>) -> Self {
        Self { status: DeliveryStatus::Delivered, delivery_date: Some(date) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrderChanged {
    pub old: SubOrder,
    pub new: SubOrder,
    /// Set when the update moved the sub-order into `Delivered` and its fund release was scheduled.
    pub fund_release: Option<FundRelease>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationSource {
    Customer { buyer_id: String },
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub sub_order: SubOrder,
    pub buyer_id: String,
    /// False if the sub-order had already been refunded and nothing changed.
    pub newly_refunded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub sub_order: SubOrder,
    pub release: FundRelease,
    pub credit: WalletTransaction,
}
