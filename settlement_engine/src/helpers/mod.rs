//! Identifier generation for new orders.
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::OrderId;

fn random_suffix(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect::<String>().to_lowercase()
}

/// `ORD-<yyyymmdd>-<8 random characters>`
pub fn generate_order_id(now: DateTime<Utc>) -> OrderId {
    OrderId(format!("ORD-{}-{}", now.format("%Y%m%d"), random_suffix(8).to_uppercase()))
}

/// The idempotency key sent to the gateway: `settle-<order-id>-<random>`. Unique per checkout attempt.
pub fn generate_tx_ref(order_id: &OrderId) -> String {
    format!("settle-{}-{}", order_id.as_str(), random_suffix(12))
}
