use chrono::{DateTime, Utc};

use crate::{
    db_types::SubOrder,
    settlement_api::query_objects::{Paginated, Pagination},
    traits::{ConfirmationSource, DeliveryUpdate, RefundOutcome, SettlementDbError, SubOrderChanged},
};

/// Storage for the per-sub-order delivery and escrow state machine.
///
/// Each mutating method re-reads the sub-order inside its transaction and validates the change with
/// [`crate::state_machine`] before writing it, so no transition is computed from a stale copy.
#[allow(async_fn_in_trait)]
pub trait EscrowManagement {
    async fn fetch_sub_order(&self, sub_order_id: i64) -> Result<Option<SubOrder>, SettlementDbError>;

    /// Applies a delivery status update.
    ///
    /// The parent order must be `paid`, and the sub-order's escrow must still be held. Entering `Delivered` sets the
    /// delivery date and return window and schedules the sub-order's fund release.
    async fn update_delivery_status(
        &self,
        sub_order_id: i64,
        update: DeliveryUpdate,
        now: DateTime<Utc>,
    ) -> Result<SubOrderChanged, SettlementDbError>;

    /// Records a buyer or administrator confirmation of delivery, and marks the fund release `ready`. Escrow is not
    /// released.
    async fn confirm_delivery(
        &self,
        sub_order_id: i64,
        source: &ConfirmationSource,
        now: DateTime<Utc>,
    ) -> Result<SubOrder, SettlementDbError>;

    /// Refunds the sub-order's escrow. If `mark_returned` is set, the delivery status moves to `Returned` in the same
    /// transaction. Any fund release for the sub-order is marked `failed`.
    ///
    /// Refunding released escrow is an invariant violation. Refunding refunded escrow returns the sub-order
    /// unchanged.
    async fn refund_escrow(
        &self,
        sub_order_id: i64,
        reason: &str,
        mark_returned: bool,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, SettlementDbError>;

    /// `Canceled` and `Failed Delivery` sub-orders whose escrow is still held, oldest first.
    async fn fetch_refund_queue(&self, pagination: Pagination) -> Result<Paginated<SubOrder>, SettlementDbError>;
}
