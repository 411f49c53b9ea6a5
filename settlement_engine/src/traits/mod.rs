//! # Backend and collaborator contracts
//!
//! The database backend traits describe what a storage engine must provide for the settlement engine to run on it.
//! Every method that changes money-bearing state runs in a single database transaction that re-reads the record it
//! is about to change. Reads do not take transactions.
//!
//! * [`OrderManagement`] stores orders and their sub-orders, and moves an order's payment status out of `pending`.
//! * [`EscrowManagement`] drives the per-sub-order delivery and escrow state machine, and serves the refund queue.
//! * [`FundReleaseManagement`] finds sub-orders whose return window has elapsed, releases them, and serves the fund
//!   release reporting queries.
//! * [`WalletManagement`] owns the store wallet ledger and withdrawals.
//! * [`SettlementDatabase`] is the union of the above, which is what [`crate::SqliteDatabase`] implements.
//!
//! The external collaborators are described here too, since the engine only ever talks to them through these
//! interfaces:
//!
//! * [`Catalog`] provides live product prices, stock, availability and store shipping options.
//! * [`PaymentGateway`] verifies transactions and initializes payments.
mod catalog;
mod data_objects;
mod escrow_management;
mod fund_release_management;
mod order_management;
mod payment_gateway;
mod settlement_database;
mod wallet_management;

pub use catalog::{Catalog, CatalogError, ProductSnapshot};
pub use data_objects::{
    ConfirmationSource,
    DeliveryUpdate,
    OrderLookup,
    PaymentStatusChange,
    RefundOutcome,
    ReleaseOutcome,
    SubOrderChanged,
};
pub use escrow_management::EscrowManagement;
pub use fund_release_management::FundReleaseManagement;
pub use order_management::OrderManagement;
pub use payment_gateway::{GatewayError, GatewayStatus, GatewayTransaction, PaymentGateway, PaymentIntent, PaymentLink};
pub use settlement_database::{SettlementDatabase, SettlementDbError};
pub use wallet_management::WalletManagement;
