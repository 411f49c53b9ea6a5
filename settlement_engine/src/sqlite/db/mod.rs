//! # SQLite Database methods
//!
//! Low-level SQLite interactions, written as plain functions that accept a `&mut SqliteConnection`. Callers pass a
//! pooled connection for reads, or `&mut *tx` to compose several calls into one atomic transaction.
//!
//! Timestamps are always bound from Rust, never taken from `CURRENT_TIMESTAMP`. They are stored as RFC 3339 text in
//! UTC, which compares correctly as a string, and callers can pin "now" in tests.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod fund_releases;
pub mod orders;
pub mod sub_orders;
pub mod wallets;

const SQLITE_DB_URL: &str = "sqlite://data/settlement.db";

/// Writers queue behind each other for up to this long before giving up with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("SETTLE_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ SETTLE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// `[timestamp] note`, the format of every line in a fund release's admin notes.
pub(crate) fn timestamped_note(note: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("[{}] {note}", now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}
