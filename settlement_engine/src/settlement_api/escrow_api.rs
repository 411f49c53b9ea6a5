use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::SubOrder,
    events::{EscrowRefundedEvent, EventProducers},
    settlement_api::{
        errors::EscrowError,
        query_objects::{Paginated, Pagination},
    },
    state_machine::{self, TransitionError},
    traits::{
        ConfirmationSource,
        DeliveryUpdate,
        EscrowManagement,
        RefundOutcome,
        SettlementDbError,
        SubOrderChanged,
    },
};

/// `EscrowApi` drives the delivery and escrow state machine of individual sub-orders: store delivery updates, buyer
/// and administrator delivery confirmations, approved returns and the refund queue.
///
/// Releasing escrow is not done here. That is the job of the fund release scheduler
/// ([`crate::FundReleaseApi`]).
pub struct EscrowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B: Debug> Debug for EscrowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowApi ({:?})", self.db)
    }
}

impl<B> EscrowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> EscrowApi<B>
where B: EscrowManagement
{
    pub async fn sub_order(&self, sub_order_id: i64) -> Result<SubOrder, EscrowError> {
        self.db.fetch_sub_order(sub_order_id).await?.ok_or(EscrowError::SubOrderNotFound(sub_order_id))
    }

    /// Moves the sub-order to a new delivery status. Re-sending the current status is a harmless no-op: the
    /// sub-order is returned unchanged.
    pub async fn update_delivery_status(
        &self,
        sub_order_id: i64,
        update: DeliveryUpdate,
        now: DateTime<Utc>,
    ) -> Result<SubOrderChanged, EscrowError> {
        match self.db.update_delivery_status(sub_order_id, update, now).await {
            Ok(changed) => {
                debug!(
                    "📦️ Sub-order #{sub_order_id} is now {} (was {})",
                    changed.new.delivery_status, changed.old.delivery_status
                );
                if let Some(release) = &changed.fund_release {
                    debug!(
                        "📦️ Escrow for sub-order #{sub_order_id} becomes releasable after {}",
                        release.scheduled_release_time
                    );
                }
                Ok(changed)
            },
            Err(SettlementDbError::Transition(TransitionError::NoChange(_))) => {
                let current = self.sub_order(sub_order_id).await?;
                trace!("📦️ Sub-order #{sub_order_id} is already {}", current.delivery_status);
                Ok(SubOrderChanged { old: current.clone(), new: current, fund_release: None })
            },
            Err(e) => Err(e.into()),
        }
    }

    /// The buyer confirms they received the sub-order. Escrow stays held until the return window closes.
    pub async fn confirm_delivery(
        &self,
        sub_order_id: i64,
        buyer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SubOrder, EscrowError> {
        let source = ConfirmationSource::Customer { buyer_id: buyer_id.to_string() };
        let sub_order = self.db.confirm_delivery(sub_order_id, &source, now).await?;
        debug!("📦️ Buyer {buyer_id} confirmed delivery of sub-order #{sub_order_id}");
        Ok(sub_order)
    }

    /// Manual confirmation by an administrator, allowed once the delivery is two days old. Like the buyer's
    /// confirmation, this does not release escrow.
    pub async fn admin_confirm_delivery(&self, sub_order_id: i64, now: DateTime<Utc>) -> Result<SubOrder, EscrowError> {
        let sub_order = self.db.confirm_delivery(sub_order_id, &ConfirmationSource::Admin, now).await?;
        debug!("📦️ Delivery of sub-order #{sub_order_id} confirmed by an administrator");
        Ok(sub_order)
    }

    /// The returns workflow approved a return. The sub-order is marked `Returned` and its escrow refunded, together.
    pub async fn approve_return(
        &self,
        sub_order_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, EscrowError> {
        self.refund(sub_order_id, reason, true, now).await
    }

    /// Cancelled and failed deliveries whose escrow is still held, waiting for an administrator to approve a refund.
    pub async fn refund_queue(&self, pagination: Pagination) -> Result<Paginated<SubOrder>, EscrowError> {
        let queue = self.db.fetch_refund_queue(pagination).await?;
        Ok(queue)
    }

    /// Approves the refund of a sub-order in the refund queue. Approving an already refunded sub-order returns it
    /// unchanged.
    pub async fn approve_queued_refund(
        &self,
        sub_order_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, EscrowError> {
        let sub_order = self.sub_order(sub_order_id).await?;
        if !sub_order.escrow.refunded && !state_machine::is_refund_queue_candidate(&sub_order) {
            debug!(
                "📦️ Sub-order #{sub_order_id} is {} and not in the refund queue. Refund refused",
                sub_order.delivery_status
            );
            return Err(EscrowError::NotInRefundQueue(sub_order_id));
        }
        self.refund(sub_order_id, reason, false, now).await
    }

    async fn refund(
        &self,
        sub_order_id: i64,
        reason: &str,
        mark_returned: bool,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, EscrowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::MissingReason);
        }
        let outcome = self.db.refund_escrow(sub_order_id, reason, mark_returned, now).await?;
        if outcome.newly_refunded {
            info!("📦️ Escrow for sub-order #{sub_order_id} refunded: {reason}");
            let event = EscrowRefundedEvent::new(outcome.sub_order.clone(), outcome.buyer_id.clone(), reason.into());
            self.producers.escrow_refunded(event).await;
        } else {
            warn!("📦️ Refund requested for sub-order #{sub_order_id}, but it was already refunded");
        }
        Ok(outcome)
    }
}
