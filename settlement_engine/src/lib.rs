//! Settlement Engine
//!
//! The settlement engine tracks a buyer's money from checkout until it is either released to the seller's wallet or
//! refunded to the buyer. It is provider-agnostic: the catalog and the payment gateway are reached through the traits
//! in [`traits`], and storage through the backend traits in the same module.
//!
//! The library is divided into these main sections:
//! 1. Database management ([`mod@sqlite`]). SQLite is the supported backend. Callers should use the public APIs
//!    rather than the database directly. The data types stored in the database live in [`db_types`] and are public.
//! 2. The delivery and escrow state machine ([`state_machine`]). Pure functions that decide which transitions are
//!    legal. The backend calls them inside its transactions.
//! 3. The public API ([`mod@settlement_api`]): checkout, payment verification, escrow, fund release and wallets.
//!
//! The engine also publishes events when money moves: a payment status changes, escrow is released or refunded, a
//! withdrawal is requested, or a release fails. See [`events`] for how to hook into them.
mod error_kind;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod settlement_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod state_machine;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use error_kind::ErrorKind;
pub use settlement_api::{
    checkout_api::{CheckoutApi, CheckoutPolicy},
    errors::{CheckoutError, EscrowError, FundReleaseError, PaymentVerificationError, WalletError},
    escrow_api::EscrowApi,
    fund_release_api::{FundReleaseApi, ReleasePolicy, ReleaseRunResult},
    payment_verifier::{PaymentReference, PaymentVerifierApi, VerificationOutcome, VerificationStatus},
    wallet_api::{WalletApi, WithdrawalPolicy},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    Catalog,
    EscrowManagement,
    FundReleaseManagement,
    OrderManagement,
    PaymentGateway,
    SettlementDatabase,
    SettlementDbError,
    WalletManagement,
};
