use std::fmt::{Debug, Display};

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_common::CURRENCY_CODE;

use crate::{
    db_types::{Order, OrderId, PaymentStatus},
    events::{EventProducers, PaymentStatusChangedEvent},
    settlement_api::{checkout_api::DEFAULT_PAYMENT_GRACE_MINS, errors::PaymentVerificationError},
    traits::{GatewayStatus, GatewayTransaction, OrderLookup, OrderManagement, PaymentGateway, PaymentStatusChange},
};

/// A payment reference the server can check with the gateway itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentReference {
    TransactionId(String),
    TxRef(String),
}

impl Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentReference::TransactionId(id) => write!(f, "transaction {id}"),
            PaymentReference::TxRef(tx_ref) => write!(f, "tx_ref {tx_ref}"),
        }
    }
}

/// The resolved outcome of a payment attempt.
///
/// `Successful` means the gateway has the money but the order has not been finalized yet. `Paid` means the order is
/// finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Successful,
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl From<PaymentStatus> for VerificationStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => VerificationStatus::Pending,
            PaymentStatus::Paid => VerificationStatus::Paid,
            PaymentStatus::Failed => VerificationStatus::Failed,
            PaymentStatus::Cancelled => VerificationStatus::Cancelled,
        }
    }
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerificationStatus::Successful => "successful",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Paid => "paid",
            VerificationStatus::Failed => "failed",
            VerificationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Always `true`. Failures are reported as `{"ok": false, "error": ..}` instead
    pub ok: bool,
    pub order_id: Option<OrderId>,
    pub status: VerificationStatus,
    /// The order's status changed during this call
    pub changed: bool,
}

impl VerificationOutcome {
    fn from_change(change: &PaymentStatusChange) -> Self {
        Self {
            ok: true,
            order_id: Some(change.order.order_id.clone()),
            status: change.order.payment_status.into(),
            changed: change.changed,
        }
    }
}

/// `PaymentVerifierApi` resolves the true outcome of a payment attempt, exactly once.
///
/// It may be invoked any number of times for the same payment (buyer redirect, gateway webhook, admin check). The
/// gateway is always consulted first, outside of any database transaction, and every order update is guarded on the
/// order still being `pending`, so a terminal order never moves again.
pub struct PaymentVerifierApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    grace_period: Duration,
}

impl<B, G> Debug for PaymentVerifierApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentVerifierApi (grace: {})", self.grace_period)
    }
}

impl<B, G> PaymentVerifierApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers, grace_period: Duration::minutes(DEFAULT_PAYMENT_GRACE_MINS) }
    }

    /// How far the expiry of an annulled order is pushed out.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl<B, G> PaymentVerifierApi<B, G>
where
    B: OrderManagement,
    G: PaymentGateway,
{
    /// Verifies a payment.
    ///
    /// With a transaction id, the gateway's status decides:
    /// * successful: returned as is. Use [`Self::finalize`] to mark the order paid.
    /// * pending: returned as is, nothing changes.
    /// * anything else: a still-pending order is marked `failed` or `cancelled`. An already terminal order is left
    ///   alone and its status returned.
    ///
    /// With only a tx_ref, the buyer never completed the payment. A pending order is cancelled, a terminal one is
    /// returned as is.
    pub async fn verify(
        &self,
        reference: &PaymentReference,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, PaymentVerificationError> {
        match reference {
            PaymentReference::TransactionId(id) => {
                if id.trim().is_empty() {
                    return Err(PaymentVerificationError::EmptyReference);
                }
                let transaction = self.gateway.verify_transaction(id).await?;
                self.reconcile(&transaction, now).await
            },
            PaymentReference::TxRef(tx_ref) => {
                if tx_ref.trim().is_empty() {
                    return Err(PaymentVerificationError::EmptyReference);
                }
                trace!("🔄️ No transaction for {tx_ref}. Treating the payment as abandoned");
                let lookup = OrderLookup::TxRef(tx_ref.clone());
                let change = self.annul(&lookup, PaymentStatus::Cancelled, now).await?;
                Ok(VerificationOutcome::from_change(&change))
            },
        }
    }

    /// Finalizes a successful payment: the order moves from `pending` to `paid`.
    ///
    /// The gateway is asked again, never the caller. The gateway must report success, its tx_ref must match the
    /// order's, and the amount collected must cover the order total. A payment that is not successful is reconciled as
    /// in [`Self::verify`] instead.
    pub async fn finalize(
        &self,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, PaymentVerificationError> {
        if transaction_id.trim().is_empty() {
            return Err(PaymentVerificationError::EmptyReference);
        }
        let transaction = self.gateway.verify_transaction(transaction_id).await?;
        self.finalize_transaction(&transaction, None, now).await
    }

    /// The buyer's redirect back from the gateway. Any status the redirect carried is ignored.
    pub async fn checkout_success(
        &self,
        tx_ref: &str,
        transaction_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, PaymentVerificationError> {
        match transaction_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                let transaction = self.gateway.verify_transaction(id).await?;
                self.finalize_transaction(&transaction, Some(tx_ref), now).await
            },
            None => self.verify(&PaymentReference::TxRef(tx_ref.to_string()), now).await,
        }
    }

    /// Cancels every pending order whose payment window has passed.
    pub async fn expire_abandoned_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, PaymentVerificationError> {
        let expired = self.db.expire_abandoned_orders(now).await?;
        if !expired.is_empty() {
            info!("🔄️ {} abandoned orders cancelled", expired.len());
        }
        for order in &expired {
            let event = PaymentStatusChangedEvent::new(order.clone(), PaymentStatus::Pending);
            self.producers.payment_status_changed(event).await;
        }
        Ok(expired)
    }

    async fn finalize_transaction(
        &self,
        transaction: &GatewayTransaction,
        expected_tx_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, PaymentVerificationError> {
        if let Some(expected) = expected_tx_ref {
            if transaction.tx_ref.as_deref() != Some(expected) {
                warn!(
                    "🔄️ Transaction {} belongs to tx_ref {:?}, not {expected}",
                    transaction.transaction_id, transaction.tx_ref
                );
                return Err(PaymentVerificationError::TxRefMismatch {
                    expected: expected.to_string(),
                    actual: transaction.tx_ref.clone(),
                });
            }
        }
        if transaction.gateway_status() != GatewayStatus::Successful {
            return self.reconcile(transaction, now).await;
        }
        let lookup = order_lookup(transaction)?;
        let order = match &lookup {
            OrderLookup::OrderId(id) => self.db.fetch_order(id).await?,
            OrderLookup::TxRef(tx_ref) => self.db.fetch_order_by_tx_ref(tx_ref).await?,
        }
        .ok_or_else(|| PaymentVerificationError::OrderNotFound(lookup.to_string()))?;
        check_transaction_matches(transaction, &order)?;
        let change = self.db.mark_order_paid(&OrderLookup::OrderId(order.order_id.clone()), now).await?;
        if change.changed {
            info!("🔄️ Order {} paid with transaction {}", change.order.order_id, transaction.transaction_id);
            self.publish(&change).await;
        } else {
            debug!("🔄️ Order {} was already paid. Transaction {} ignored", order.order_id, transaction.transaction_id);
        }
        Ok(VerificationOutcome::from_change(&change))
    }

    /// Applies a verified (non-finalizing) gateway outcome.
    async fn reconcile(
        &self,
        transaction: &GatewayTransaction,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, PaymentVerificationError> {
        let status = transaction.gateway_status();
        trace!("🔄️ Gateway reports {status} for transaction {}", transaction.transaction_id);
        match status {
            GatewayStatus::Successful | GatewayStatus::Pending => Ok(VerificationOutcome {
                ok: true,
                order_id: transaction.order_id.clone(),
                status: if status == GatewayStatus::Pending {
                    VerificationStatus::Pending
                } else {
                    VerificationStatus::Successful
                },
                changed: false,
            }),
            GatewayStatus::Failed | GatewayStatus::Cancelled => {
                let target =
                    if status == GatewayStatus::Failed { PaymentStatus::Failed } else { PaymentStatus::Cancelled };
                let lookup = order_lookup(transaction)?;
                let change = self.annul(&lookup, target, now).await?;
                if change.order.payment_status == PaymentStatus::Paid {
                    warn!(
                        "🔄️ The gateway reports {status} for transaction {}, but order {} is already paid",
                        transaction.transaction_id, change.order.order_id
                    );
                }
                Ok(VerificationOutcome::from_change(&change))
            },
        }
    }

    async fn annul(
        &self,
        lookup: &OrderLookup,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatusChange, PaymentVerificationError> {
        let change = self.db.annul_pending_order(lookup, status, now + self.grace_period, now).await?;
        if change.changed {
            debug!("🔄️ Order {} is now {}", change.order.order_id, change.order.payment_status);
            self.publish(&change).await;
        } else {
            debug!("🔄️ Order {} is already {}. Nothing to do", change.order.order_id, change.order.payment_status);
        }
        Ok(change)
    }

    async fn publish(&self, change: &PaymentStatusChange) {
        let event = PaymentStatusChangedEvent::new(change.order.clone(), change.old_status);
        self.producers.payment_status_changed(event).await;
    }
}

/// The gateway's metadata order id is preferred. The tx_ref is the fallback.
fn order_lookup(transaction: &GatewayTransaction) -> Result<OrderLookup, PaymentVerificationError> {
    match (&transaction.order_id, &transaction.tx_ref) {
        (Some(order_id), _) => Ok(OrderLookup::OrderId(order_id.clone())),
        (None, Some(tx_ref)) => Ok(OrderLookup::TxRef(tx_ref.clone())),
        (None, None) => Err(PaymentVerificationError::MissingOrderReference(transaction.transaction_id.clone())),
    }
}

fn check_transaction_matches(transaction: &GatewayTransaction, order: &Order) -> Result<(), PaymentVerificationError> {
    if transaction.tx_ref.as_deref() != Some(order.tx_ref.as_str()) {
        warn!(
            "🔄️ Transaction {} carries tx_ref {:?}, but order {} expects {}",
            transaction.transaction_id, transaction.tx_ref, order.order_id, order.tx_ref
        );
        return Err(PaymentVerificationError::TxRefMismatch {
            expected: order.tx_ref.clone(),
            actual: transaction.tx_ref.clone(),
        });
    }
    if let Some(currency) = &transaction.currency {
        if !currency.eq_ignore_ascii_case(CURRENCY_CODE) {
            return Err(PaymentVerificationError::CurrencyMismatch(currency.clone()));
        }
    }
    match transaction.amount {
        Some(amount) if amount >= order.total_amount => Ok(()),
        received => {
            warn!(
                "🔄️ Order {} costs {}, but transaction {} collected {received:?}",
                order.order_id, order.total_amount, transaction.transaction_id
            );
            Err(PaymentVerificationError::AmountMismatch {
                order_id: order.order_id.clone(),
                expected: order.total_amount,
                received,
            })
        },
    }
}
