//! # Delivery / escrow state machine
//!
//! Pure rules for moving a sub-order through its delivery statuses and for mutating its escrow record. Nothing in
//! here touches the database: the backend re-reads the sub-order inside a transaction, asks these functions whether
//! the change is allowed, and then writes the result with a guarded `UPDATE`.
//!
//! Delivery statuses advance along
//!
//! ```text
//! Pending -> Processing -> Shipped -> Out for Delivery -> Delivered
//! ```
//!
//! (skipping forward is fine), with `Canceled`, `Failed Delivery` and `Returned` reachable from any pre-`Delivered`
//! status. A `Delivered` sub-order can still be `Returned` while its escrow is held, and so can a `Failed Delivery`.
//!
//! Escrow starts `held` and ends in exactly one of `released` or `refunded`. Once it is terminal the sub-order is
//! frozen.
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{CustomerConfirmation, DeliveryStatus, EscrowRecord, EscrowState, SubOrder},
    ErrorKind,
};

pub const RETURN_WINDOW_DAYS: i64 = 7;
pub const ADMIN_CONFIRMATION_GRACE_DAYS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("The sub-order is already {0}")]
    NoChange(DeliveryStatus),
    #[error("A sub-order cannot move from {from} to {to}")]
    IllegalTransition { from: DeliveryStatus, to: DeliveryStatus },
    #[error("Escrow is already {0}. The sub-order can no longer be modified")]
    EscrowClosed(EscrowState),
    #[error("Escrow has already been released")]
    AlreadyReleased,
    #[error("Escrow has already been refunded")]
    AlreadyRefunded,
    #[error("Refusing to refund a sub-order whose escrow has been released")]
    RefundAfterRelease,
    #[error("Refusing to release a sub-order whose escrow has been refunded")]
    ReleaseAfterRefund,
    #[error("The escrow record is corrupt: {0}")]
    CorruptEscrow(String),
    #[error("The sub-order is {0}, not Delivered")]
    NotDelivered(DeliveryStatus),
    #[error("The return window is open until {0}")]
    ReturnWindowOpen(DateTime<Utc>),
    #[error("The sub-order is Delivered but has no return window")]
    MissingReturnWindow,
    #[error("Administrators may confirm delivery from {0} onwards")]
    ConfirmationTooEarly(DateTime<Utc>),
    #[error("Delivery has already been confirmed")]
    AlreadyConfirmed,
    #[error("A delivery date of {date} is not between {earliest} and {latest}")]
    InvalidDeliveryDate { date: DateTime<Utc>, earliest: DateTime<Utc>, latest: DateTime<Utc> },
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        use TransitionError::*;
        match self {
            NoChange(_) | EscrowClosed(_) | AlreadyReleased | AlreadyRefunded | AlreadyConfirmed => ErrorKind::Conflict,
            IllegalTransition { .. } |
            NotDelivered(_) |
            ReturnWindowOpen(_) |
            ConfirmationTooEarly(_) |
            InvalidDeliveryDate { .. } => ErrorKind::Validation,
            RefundAfterRelease | ReleaseAfterRefund | CorruptEscrow(_) | MissingReturnWindow => {
                ErrorKind::InvariantViolation
            },
        }
    }
}

/// Position along the happy path. `None` for the side branches.
fn forward_rank(status: DeliveryStatus) -> Option<u8> {
    match status {
        DeliveryStatus::Pending => Some(0),
        DeliveryStatus::Processing => Some(1),
        DeliveryStatus::Shipped => Some(2),
        DeliveryStatus::OutForDelivery => Some(3),
        DeliveryStatus::Delivered => Some(4),
        _ => None,
    }
}

fn is_pre_delivered(status: DeliveryStatus) -> bool {
    forward_rank(status).map(|r| r < 4).unwrap_or(false)
}

/// Delivery statuses a sub-order can never leave.
pub fn is_terminal_delivery(status: DeliveryStatus) -> bool {
    matches!(status, DeliveryStatus::Canceled | DeliveryStatus::Returned)
}

/// Reads the escrow state, mapping corrupt flag combinations to [`TransitionError::CorruptEscrow`].
pub fn escrow_state(escrow: &EscrowRecord) -> Result<EscrowState, TransitionError> {
    escrow.state().map_err(TransitionError::CorruptEscrow)
}

/// Checks whether a sub-order may move from `from` to `to` given its current escrow record.
pub fn check_delivery_transition(
    from: DeliveryStatus,
    to: DeliveryStatus,
    escrow: &EscrowRecord,
) -> Result<(), TransitionError> {
    let state = escrow_state(escrow)?;
    if state != EscrowState::Held {
        return Err(TransitionError::EscrowClosed(state));
    }
    if from == to {
        return Err(TransitionError::NoChange(from));
    }
    let illegal = || TransitionError::IllegalTransition { from, to };
    if is_terminal_delivery(from) {
        return Err(illegal());
    }
    match to {
        DeliveryStatus::Canceled | DeliveryStatus::FailedDelivery if is_pre_delivered(from) => Ok(()),
        DeliveryStatus::Returned
            if is_pre_delivered(from) ||
                matches!(from, DeliveryStatus::Delivered | DeliveryStatus::FailedDelivery) =>
        {
            Ok(())
        },
        _ => match (forward_rank(from), forward_rank(to)) {
            (Some(f), Some(t)) if t > f => Ok(()),
            _ => Err(illegal()),
        },
    }
}

/// `delivery_date + 7 days`, exactly.
pub fn return_window_for(delivery_date: DateTime<Utc>) -> DateTime<Utc> {
    delivery_date + Duration::days(RETURN_WINDOW_DAYS)
}

/// The delivery date recorded when a sub-order enters `Delivered`.
///
/// A reported date may not lie in the future, nor before the sub-order was created. Either would move the return
/// window away from the real delivery and let escrow be released early or held indefinitely.
pub fn delivery_date_for(
    reported: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TransitionError> {
    match reported {
        None => Ok(now),
        Some(date) if date > now || date < created_at => {
            Err(TransitionError::InvalidDeliveryDate { date, earliest: created_at, latest: now })
        },
        Some(date) => Ok(date),
    }
}

/// The earliest time an administrator may confirm delivery on the buyer's behalf.
pub fn admin_confirmation_opens_at(delivery_date: DateTime<Utc>) -> DateTime<Utc> {
    delivery_date + Duration::days(ADMIN_CONFIRMATION_GRACE_DAYS)
}

fn check_confirmable(sub_order: &SubOrder) -> Result<DateTime<Utc>, TransitionError> {
    let state = escrow_state(&sub_order.escrow)?;
    if state != EscrowState::Held {
        return Err(TransitionError::EscrowClosed(state));
    }
    if sub_order.delivery_status != DeliveryStatus::Delivered {
        return Err(TransitionError::NotDelivered(sub_order.delivery_status));
    }
    if sub_order.customer_confirmation.is_confirmed() {
        return Err(TransitionError::AlreadyConfirmed);
    }
    sub_order.delivery_date.ok_or(TransitionError::MissingReturnWindow)
}

/// Buyer confirmation of delivery. Does not release escrow.
pub fn customer_confirmation(sub_order: &SubOrder, now: DateTime<Utc>) -> Result<CustomerConfirmation, TransitionError> {
    check_confirmable(sub_order)?;
    Ok(CustomerConfirmation { confirmed: true, confirmed_at: Some(now), auto_confirmed: false })
}

/// Administrator confirmation of delivery. Only allowed once the grace period after delivery has passed. Does not
/// release escrow.
pub fn admin_confirmation(sub_order: &SubOrder, now: DateTime<Utc>) -> Result<CustomerConfirmation, TransitionError> {
    let delivered_at = check_confirmable(sub_order)?;
    let opens_at = admin_confirmation_opens_at(delivered_at);
    if now < opens_at {
        return Err(TransitionError::ConfirmationTooEarly(opens_at));
    }
    Ok(CustomerConfirmation { confirmed: false, confirmed_at: Some(now), auto_confirmed: true })
}

/// Checks the release predicate: escrow held, delivery status `Delivered` and `now > return_window`.
pub fn check_release(sub_order: &SubOrder, now: DateTime<Utc>) -> Result<(), TransitionError> {
    match escrow_state(&sub_order.escrow)? {
        EscrowState::Released => return Err(TransitionError::AlreadyReleased),
        EscrowState::Refunded => return Err(TransitionError::ReleaseAfterRefund),
        EscrowState::Held => {},
    }
    if sub_order.delivery_status != DeliveryStatus::Delivered {
        return Err(TransitionError::NotDelivered(sub_order.delivery_status));
    }
    let window = sub_order.return_window.ok_or(TransitionError::MissingReturnWindow)?;
    if now <= window {
        return Err(TransitionError::ReturnWindowOpen(window));
    }
    Ok(())
}

/// The escrow record after a release. Fails unless the release predicate holds.
pub fn released_escrow(sub_order: &SubOrder, now: DateTime<Utc>) -> Result<EscrowRecord, TransitionError> {
    check_release(sub_order, now)?;
    Ok(EscrowRecord { held: false, released: true, refunded: false, released_at: Some(now), ..sub_order.escrow.clone() })
}

/// The escrow record after a refund.
pub fn refunded_escrow(escrow: &EscrowRecord, reason: &str, now: DateTime<Utc>) -> Result<EscrowRecord, TransitionError> {
    match escrow_state(escrow)? {
        EscrowState::Released => Err(TransitionError::RefundAfterRelease),
        EscrowState::Refunded => Err(TransitionError::AlreadyRefunded),
        EscrowState::Held => Ok(EscrowRecord {
            held: false,
            released: false,
            refunded: true,
            refunded_at: Some(now),
            refund_reason: Some(reason.to_string()),
            ..escrow.clone()
        }),
    }
}

/// The refund queue predicate: a `Canceled` or `Failed Delivery` sub-order whose escrow is still held.
pub fn is_refund_queue_candidate(sub_order: &SubOrder) -> bool {
    matches!(sub_order.delivery_status, DeliveryStatus::Canceled | DeliveryStatus::FailedDelivery) &&
        matches!(sub_order.escrow.state(), Ok(EscrowState::Held))
}
