use settlement_common::Kobo;
use thiserror::Error;

use crate::{
    db_types::{FundReleaseStatus, OrderId, PaymentStatus, StoreId},
    state_machine::TransitionError,
    traits::{EscrowManagement, FundReleaseManagement, OrderManagement, WalletManagement},
    ErrorKind,
};

/// The highest level of behaviour for a settlement backend. Implementations provide every storage trait the engine's
/// APIs need.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase:
    Clone + OrderManagement + EscrowManagement + FundReleaseManagement + WalletManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("An order with tx_ref {0} already exists")]
    OrderAlreadyExists(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(String),
    #[error("Sub-order {0} does not exist")]
    SubOrderNotFound(i64),
    #[error("Fund release {0} does not exist")]
    FundReleaseNotFound(i64),
    #[error("Order {0} has not been paid")]
    OrderNotPaid(OrderId),
    #[error("The total of order {0} is too large")]
    AmountOverflow(OrderId),
    #[error("Order {order_id} is already {status} and can no longer change")]
    OrderAlreadyFinal { order_id: OrderId, status: PaymentStatus },
    #[error("Only the buyer of order {0} may confirm its delivery")]
    NotBuyer(OrderId),
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("A fund release cannot move from {from} to {to}")]
    IllegalReleaseTransition { from: FundReleaseStatus, to: FundReleaseStatus },
    #[error("Insufficient funds in the wallet of {store_id}. Available: {available}, requested: {requested}")]
    InsufficientFunds { store_id: StoreId, available: Kobo, requested: Kobo },
    #[error("{0} was modified by another request. Try again")]
    ConcurrentModification(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl SettlementDbError {
    pub fn kind(&self) -> ErrorKind {
        use SettlementDbError::*;
        match self {
            DatabaseError(_) | ConcurrentModification(_) => ErrorKind::Transient,
            OrderAlreadyExists(_) | OrderAlreadyFinal { .. } | IllegalReleaseTransition { .. } => ErrorKind::Conflict,
            OrderNotFound(_) | SubOrderNotFound(_) | FundReleaseNotFound(_) => ErrorKind::NotFound,
            OrderNotPaid(_) | AmountOverflow(_) | NotBuyer(_) | InsufficientFunds { .. } => ErrorKind::Validation,
            Transition(e) => e.kind(),
            InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // CHECK constraints and the `invariant:` triggers encode the domain invariants in the schema
            sqlx::Error::Database(db) if db.is_check_violation() || db.message().contains("invariant:") => {
                SettlementDbError::InvariantViolation(db.message().to_string())
            },
            _ => SettlementDbError::DatabaseError(e.to_string()),
        }
    }
}
