use serde::{Deserialize, Serialize};
use settlement_common::Kobo;

use crate::db_types::{FundRelease, Order, PaymentStatus, SubOrder, WalletTransaction, Withdrawal};

/// An order's payment status changed. Published after `pending -> paid | failed | cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChangedEvent {
    pub order: Order,
    pub old_status: PaymentStatus,
}

impl PaymentStatusChangedEvent {
    pub fn new(order: Order, old_status: PaymentStatus) -> Self {
        Self { order, old_status }
    }

    pub fn new_status(&self) -> PaymentStatus {
        self.order.payment_status
    }
}

/// Escrow for a sub-order was released and the store's wallet credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowReleasedEvent {
    pub sub_order: SubOrder,
    pub release: FundRelease,
    pub credit: WalletTransaction,
}

/// Escrow for a sub-order was refunded. Subscribers are responsible for returning `amount` to the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRefundedEvent {
    pub sub_order: SubOrder,
    pub buyer_id: String,
    pub amount: Kobo,
    pub reason: String,
}

impl EscrowRefundedEvent {
    pub fn new(sub_order: SubOrder, buyer_id: String, reason: String) -> Self {
        let amount = sub_order.sub_total + sub_order.shipping_cost;
        Self { sub_order, buyer_id, amount, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequestedEvent {
    pub withdrawal: Withdrawal,
    pub debit: WalletTransaction,
    pub new_balance: Kobo,
}

/// A release attempt failed. The release will be retried on the next run unless it has exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundReleaseFailedEvent {
    pub release: FundRelease,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    PaymentStatusChanged(PaymentStatusChangedEvent),
    EscrowReleased(EscrowReleasedEvent),
    EscrowRefunded(EscrowRefundedEvent),
    WithdrawalRequested(WithdrawalRequestedEvent),
    FundReleaseFailed(FundReleaseFailedEvent),
}
