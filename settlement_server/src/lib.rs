//! # Settlement server
//! This crate hosts the HTTP surface of the settlement engine. It is responsible for:
//! * Taking checkouts and handing the buyer over to the payment gateway.
//! * Verifying payments when the buyer is redirected back, or when the gateway calls the webhook.
//! * Letting stores and administrators move sub-orders through delivery, confirmation, returns and refunds.
//! * Serving fund release and wallet reports, and taking withdrawal requests.
//! * Running the release scheduler and the abandoned payment expiry in the background.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! See [routes](routes/index.html). Routes under `/admin`, and the store reporting routes, require an administrator
//! with the appropriate [`auth::Permission`].
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;

pub mod data_objects;
pub mod routes;
pub mod server;
pub mod settlement_worker;

#[cfg(test)]
mod endpoint_tests;
