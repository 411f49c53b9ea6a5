use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus, SubOrder},
    traits::{OrderLookup, PaymentStatusChange, SettlementDbError},
};

/// Storage for orders and the payment-status half of their lifecycle.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores the order and one sub-order per store in a single atomic transaction. The order is `pending` and every
    /// sub-order's escrow is `held`.
    ///
    /// Fails with [`SettlementDbError::OrderAlreadyExists`] if the `tx_ref` or order id has been used before.
    async fn insert_order(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<SubOrder>), SettlementDbError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_by_tx_ref(&self, tx_ref: &str) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_sub_orders_for_order(&self, order_id: &OrderId) -> Result<Vec<SubOrder>, SettlementDbError>;

    /// Transitions the order from `pending` to `paid`.
    ///
    /// * An order that is already `paid` is returned unchanged.
    /// * A `failed` or `cancelled` order is never revived: [`SettlementDbError::OrderAlreadyFinal`].
    async fn mark_order_paid(
        &self,
        lookup: &OrderLookup,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatusChange, SettlementDbError>;

    /// Transitions a `pending` order to `failed` or `cancelled`, and moves its expiry to `expires_at`.
    ///
    /// If the order is already terminal, it is returned unchanged (the idempotence guard).
    async fn annul_pending_order(
        &self,
        lookup: &OrderLookup,
        status: PaymentStatus,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatusChange, SettlementDbError>;

    /// Cancels every `pending` order whose `expires_at` is before `now`, returning the cancelled orders.
    async fn expire_abandoned_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, SettlementDbError>;
}
