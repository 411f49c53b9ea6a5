use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus},
    traits::{OrderLookup, SettlementDbError},
};

/// Inserts a new order row. This is not atomic on its own; call it inside a transaction together with the
/// sub-order inserts.
pub async fn insert_order(
    order: &NewOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, SettlementDbError> {
    let overflow = || SettlementDbError::AmountOverflow(order.order_id.clone());
    let total_amount = order.total_amount().ok_or_else(overflow)?;
    let shipping_total = order.shipping_total().ok_or_else(overflow)?;
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                buyer_id,
                store_ids,
                total_amount,
                shipping_total,
                payment_status,
                tx_ref,
                shipping_address,
                expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(&order.buyer_id)
    .bind(Json(order.store_ids()))
    .bind(total_amount)
    .bind(shipping_total)
    .bind(PaymentStatus::Pending)
    .bind(&order.tx_ref)
    .bind(Json(&order.shipping_address))
    .bind(order.expires_at)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Order {} or tx_ref {} already exists", order.order_id, order.tx_ref);
            Err(SettlementDbError::OrderAlreadyExists(order.tx_ref.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_order_by_tx_ref(tx_ref: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE tx_ref = $1").bind(tx_ref).fetch_optional(conn).await
}

pub async fn fetch_order(lookup: &OrderLookup, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    match lookup {
        OrderLookup::OrderId(id) => fetch_order_by_order_id(id, conn).await,
        OrderLookup::TxRef(tx_ref) => fetch_order_by_tx_ref(tx_ref, conn).await,
    }
}

/// Moves a `pending` order to `status`. The `WHERE` clause re-checks that the order is still pending, so `None` means
/// the order is missing or somebody else got there first.
///
/// This is a write, so calling it first in a transaction takes the database write lock before anything is read.
pub(crate) async fn resolve_pending_order(
    lookup: &OrderLookup,
    status: PaymentStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let (column, key) = match lookup {
        OrderLookup::OrderId(id) => ("order_id", id.as_str()),
        OrderLookup::TxRef(tx_ref) => ("tx_ref", tx_ref.as_str()),
    };
    let sql = format!(
        r#"
            UPDATE orders SET
                payment_status = $1,
                expires_at = COALESCE($2, expires_at),
                updated_at = $3
            WHERE {column} = $4 AND payment_status = 'pending'
            RETURNING *;
        "#
    );
    let order = sqlx::query_as(&sql).bind(status).bind(expires_at).bind(now).bind(key).fetch_optional(conn).await?;
    trace!("🗃️ Resolving {lookup} to {status}: {}", if order.is_some() { "done" } else { "not pending" });
    Ok(order)
}

/// Cancels all pending orders that expired before `now` in a single guarded statement.
pub(crate) async fn cancel_expired_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE orders SET payment_status = 'cancelled', updated_at = $1
            WHERE payment_status = 'pending' AND expires_at < $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await
}
