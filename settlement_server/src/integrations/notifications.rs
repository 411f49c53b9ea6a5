//! Notifications and the audit trail.
//!
//! Both are fire-and-forget. They are fed from the engine's post-commit events, so a notifier that is down or slow
//! can never undo or delay a change to an order, an escrow or a wallet.
use std::{fmt::Display, future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use settlement_engine::{
    db_types::PaymentStatus,
    events::{
        EscrowRefundedEvent,
        EscrowReleasedEvent,
        EventHandlers,
        EventHooks,
        FundReleaseFailedEvent,
        PaymentStatusChangedEvent,
        WithdrawalRequestedEvent,
    },
};
use thiserror::Error;

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 50;
/// Recipient of operational alerts, such as releases that keep failing.
pub const OPERATIONS_RECIPIENT: &str = "operations";
const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    PaymentConfirmed,
    PaymentFailed,
    FundsReleased,
    RefundIssued,
    WithdrawalRequested,
    FundReleaseFailed,
}

impl Display for EmailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmailType::PaymentConfirmed => "payment_confirmed",
            EmailType::PaymentFailed => "payment_failed",
            EmailType::FundsReleased => "funds_released",
            EmailType::RefundIssued => "refund_issued",
            EmailType::WithdrawalRequested => "withdrawal_requested",
            EmailType::FundReleaseFailed => "fund_release_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Could not send notification: {0}")]
pub struct NotificationError(pub String);

/// Delivers a templated message to a buyer, a store or the operations team. `recipient` is an account id; resolving
/// it to an address is the notifier's job.
pub trait Notifier {
    fn send(
        &self,
        email_type: EmailType,
        recipient: &str,
        data: Value,
    ) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, email_type: EmailType, recipient: &str, data: Value) -> Result<(), NotificationError> {
        info!(target: "settle::notifications", "✉️ [{email_type}] to {recipient}: {data}");
        Ok(())
    }
}

/// One line in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub target: String,
    pub details: Value,
    pub remote_ip: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new<A: Into<String>, B: Into<String>, C: Into<String>>(actor: A, action: B, target: C) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            details: Value::Null,
            remote_ip: None,
            at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_remote_ip<S: ToString>(mut self, ip: Option<S>) -> Self {
        self.remote_ip = ip.map(|s| s.to_string());
        self
    }
}

pub trait AuditLog: Send + Sync {
    /// Records an action. Must not block and must not fail the caller.
    fn log_action(&self, entry: AuditEntry);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditLog;

impl AuditLog for LogAuditLog {
    fn log_action(&self, entry: AuditEntry) {
        match serde_json::to_string(&entry) {
            Ok(s) => info!(target: "settle::audit", "{s}"),
            Err(e) => warn!(target: "settle::audit", "Could not serialize audit entry {entry:?}. {e}"),
        }
    }
}

/// Wires the notifier and the audit log to the engine's events.
///
/// * A payment becoming `paid` notifies the buyer. `failed` and `cancelled` do too, with a different template.
/// * A release notifies the store and is audited.
/// * A refund notifies the buyer and is audited. Paying the money back through the gateway is a separate subscriber.
/// * A withdrawal request notifies the store and is audited.
/// * A failed release alerts operations.
pub fn create_notification_event_handlers<N>(notifier: N, audit: Arc<dyn AuditLog>) -> EventHandlers
where N: Notifier + Clone + Send + Sync + 'static {
    let mut hooks = EventHooks::default();

    let n = notifier.clone();
    hooks.on_payment_status_changed(move |ev: PaymentStatusChangedEvent| {
        let email_type = match ev.new_status() {
            PaymentStatus::Paid => EmailType::PaymentConfirmed,
            PaymentStatus::Failed | PaymentStatus::Cancelled => EmailType::PaymentFailed,
            PaymentStatus::Pending => return no_op(),
        };
        let order = ev.order;
        let data = json!({
            "order_id": order.order_id.as_str(),
            "status": order.payment_status,
            "total_amount": order.total_amount.to_major_string(),
        });
        send_notification(n.clone(), email_type, order.buyer_id, data)
    });

    let n = notifier.clone();
    let a = Arc::clone(&audit);
    hooks.on_escrow_released(move |ev: EscrowReleasedEvent| {
        let EscrowReleasedEvent { sub_order, release, credit } = ev;
        let data = json!({
            "order_id": sub_order.order_id.as_str(),
            "sub_order_id": sub_order.id,
            "amount": release.amount.to_major_string(),
            "wallet_transaction_id": credit.id,
        });
        a.log_action(
            AuditEntry::new(SYSTEM_ACTOR, "escrow_released", format!("sub_order:{}", sub_order.id))
                .with_details(data.clone()),
        );
        send_notification(n.clone(), EmailType::FundsReleased, sub_order.store_id.to_string(), data)
    });

    let n = notifier.clone();
    let a = Arc::clone(&audit);
    hooks.on_escrow_refunded(move |ev: EscrowRefundedEvent| {
        let EscrowRefundedEvent { sub_order, buyer_id, amount, reason } = ev;
        let data = json!({
            "order_id": sub_order.order_id.as_str(),
            "sub_order_id": sub_order.id,
            "store_id": sub_order.store_id,
            "amount": amount.to_major_string(),
            "reason": reason,
        });
        a.log_action(
            AuditEntry::new(SYSTEM_ACTOR, "escrow_refunded", format!("sub_order:{}", sub_order.id))
                .with_details(data.clone()),
        );
        send_notification(n.clone(), EmailType::RefundIssued, buyer_id, data)
    });

    let n = notifier.clone();
    let a = Arc::clone(&audit);
    hooks.on_withdrawal_requested(move |ev: WithdrawalRequestedEvent| {
        let WithdrawalRequestedEvent { withdrawal, debit, new_balance } = ev;
        let data = json!({
            "withdrawal_id": withdrawal.id,
            "amount": withdrawal.amount.to_major_string(),
            "fee": withdrawal.fee.to_major_string(),
            "net_amount": withdrawal.net_amount.to_major_string(),
            "wallet_transaction_id": debit.id,
            "new_balance": new_balance.to_major_string(),
        });
        a.log_action(
            AuditEntry::new(SYSTEM_ACTOR, "withdrawal_requested", format!("store:{}", withdrawal.store_id))
                .with_details(data.clone()),
        );
        send_notification(n.clone(), EmailType::WithdrawalRequested, withdrawal.store_id.to_string(), data)
    });

    let n = notifier;
    hooks.on_fund_release_failed(move |ev: FundReleaseFailedEvent| {
        let FundReleaseFailedEvent { release, reason } = ev;
        warn!("💸️ Fund release #{} for sub-order #{} failed: {reason}", release.id, release.sub_order_id);
        let data = json!({
            "release_id": release.id,
            "sub_order_id": release.sub_order_id,
            "store_id": release.store_id,
            "attempts": release.attempts,
            "status": release.status,
            "reason": reason,
        });
        send_notification(n.clone(), EmailType::FundReleaseFailed, OPERATIONS_RECIPIENT.to_string(), data)
    });

    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

fn send_notification<N>(notifier: N, email_type: EmailType, recipient: String, data: Value) -> BoxFuture<'static, ()>
where N: Notifier + Send + Sync + 'static {
    Box::pin(async move {
        match notifier.send(email_type, &recipient, data).await {
            Ok(()) => trace!("✉️ {email_type} notification sent to {recipient}"),
            Err(e) => warn!("✉️ {email_type} notification to {recipient} was not sent. {e}"),
        }
    })
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use chrono::Duration;
    use settlement_common::Kobo;
    use settlement_engine::db_types::{Json, Order, OrderId, ShippingAddress, StoreId};
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Clone)]
    struct ChannelNotifier(mpsc::UnboundedSender<(EmailType, String, Value)>);

    impl Notifier for ChannelNotifier {
        async fn send(&self, email_type: EmailType, recipient: &str, data: Value) -> Result<(), NotificationError> {
            self.0.send((email_type, recipient.to_string(), data)).map_err(|e| NotificationError(e.to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryAuditLog(Mutex<Vec<AuditEntry>>);

    impl AuditLog for MemoryAuditLog {
        fn log_action(&self, entry: AuditEntry) {
            if let Ok(mut entries) = self.0.lock() {
                entries.push(entry);
            }
        }
    }

    fn order(status: PaymentStatus) -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_id: OrderId::from("ord-1"),
            buyer_id: "buyer-1".into(),
            store_ids: Json(vec![StoreId::from("store-a")]),
            total_amount: Kobo::from(1_250_000),
            shipping_total: Kobo::from(150_000),
            payment_status: status,
            tx_ref: "tx-1".into(),
            shipping_address: Json(ShippingAddress::default()),
            expires_at: now + Duration::minutes(30),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn payment_events_notify_the_buyer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let audit = Arc::new(MemoryAuditLog::default());
        let handlers = create_notification_event_handlers(ChannelNotifier(tx), audit.clone());
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let paid = PaymentStatusChangedEvent::new(order(PaymentStatus::Paid), PaymentStatus::Pending);
        producers.payment_status_changed(paid).await;
        let cancelled = PaymentStatusChangedEvent::new(order(PaymentStatus::Cancelled), PaymentStatus::Pending);
        producers.payment_status_changed(cancelled).await;

        let (email_type, recipient, data) = rx.recv().await.expect("Notification expected");
        assert_eq!(email_type, EmailType::PaymentConfirmed);
        assert_eq!(recipient, "buyer-1");
        assert_eq!(data["total_amount"], "12500.00");
        let (email_type, _, _) = rx.recv().await.expect("Notification expected");
        assert_eq!(email_type, EmailType::PaymentFailed);
        // Payment changes are not audited
        assert!(audit.0.lock().unwrap().is_empty());
    }

    #[test]
    fn audit_entries_serialize() {
        let entry = AuditEntry::new("admin", "reverse_release", "fund_release:4")
            .with_details(json!({ "note": "duplicate" }))
            .with_remote_ip(Some("10.0.0.1"));
        let s = serde_json::to_value(&entry).unwrap();
        assert_eq!(s["actor"], "admin");
        assert_eq!(s["remote_ip"], "10.0.0.1");
        assert_eq!(s["details"]["note"], "duplicate");
        assert_eq!(EmailType::FundReleaseFailed.to_string(), "fund_release_failed");
    }
}
