//! Helpers for tests: a throwaway SQLite database, and in-memory stand-ins for the catalog and the payment gateway.
pub mod fakes;
pub mod prepare_env;
