//! # Settlement engine public API
//!
//! The `settlement_api` module exposes the programmatic API of the settlement engine. Each API covers one part of
//! the money's journey, so clients can pick the parts they need:
//!
//! * [`checkout_api`] validates carts against the live catalog, prices shipping and creates orders.
//! * [`payment_verifier`] reconciles gateway outcomes with order payment statuses, exactly once.
//! * [`escrow_api`] drives per-sub-order delivery statuses, delivery confirmations, returns and the refund queue.
//! * [`fund_release_api`] is the release scheduler, plus the fund release listings and admin actions.
//! * [`wallet_api`] reads store wallets and takes withdrawal requests.
//!
//! [`shipping`] is the pure shipping aggregator used during checkout. The remaining submodules hold request, response
//! and query types.
//!
//! # API usage
//!
//! Every API is created from a database backend that implements the backend traits it needs, plus any external
//! collaborators and an [`EventProducers`](crate::events::EventProducers) for its notifications.
//!
//! ```rust,ignore
//! use settlement_engine::{events::EventProducers, FundReleaseApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/settlement.db", 5).await?;
//! let api = FundReleaseApi::new(db, EventProducers::default());
//! let result = api.run_release_cycle(chrono::Utc::now()).await?;
//! println!("{} sub-orders released", result.released);
//! ```
pub mod checkout_api;
pub mod checkout_objects;
pub mod errors;
pub mod escrow_api;
pub mod fund_release_api;
pub mod payment_verifier;
pub mod query_objects;
pub mod shipping;
pub mod wallet_api;
