//! Sub-order rows. Every escrow-bearing update carries its own precondition in its `WHERE` clause, so an update that
//! returns no row means the sub-order changed underneath the caller.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CustomerConfirmation, DeliveryStatus, EscrowRecord, NewSubOrder, OrderId, SubOrder},
    settlement_api::query_objects::Pagination,
};

pub async fn insert_sub_order(
    order_id: &OrderId,
    sub_order: &NewSubOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<SubOrder, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO sub_orders (
                order_id,
                store_id,
                line_items,
                sub_total,
                shipping_cost,
                platform_fee,
                settlement_amount,
                delivery_status,
                shipping_method,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(sub_order.store_id.as_str())
    .bind(Json(&sub_order.line_items))
    .bind(sub_order.sub_total)
    .bind(sub_order.shipping_cost)
    .bind(sub_order.platform_fee)
    .bind(sub_order.settlement_amount)
    .bind(DeliveryStatus::Pending)
    .bind(sub_order.shipping_method.as_ref().map(Json))
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_sub_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<SubOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM sub_orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_sub_orders_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SubOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM sub_orders WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

/// Moves the delivery status on, provided it is still `from` and escrow is still held.
pub(crate) async fn update_delivery_status(
    id: i64,
    from: DeliveryStatus,
    to: DeliveryStatus,
    delivery_date: Option<DateTime<Utc>>,
    return_window: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SubOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE sub_orders SET
                delivery_status = $1,
                delivery_date = COALESCE($2, delivery_date),
                return_window = COALESCE($3, return_window),
                updated_at = $4
            WHERE id = $5 AND delivery_status = $6 AND held = 1 AND released = 0 AND refunded = 0
            RETURNING *;
        "#,
    )
    .bind(to)
    .bind(delivery_date)
    .bind(return_window)
    .bind(now)
    .bind(id)
    .bind(from)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn set_confirmation(
    id: i64,
    confirmation: &CustomerConfirmation,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SubOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE sub_orders SET
                confirmed = $1,
                confirmed_at = $2,
                auto_confirmed = $3,
                updated_at = $4
            WHERE id = $5 AND delivery_status = 'Delivered' AND held = 1 AND confirmed = 0 AND auto_confirmed = 0
            RETURNING *;
        "#,
    )
    .bind(confirmation.confirmed)
    .bind(confirmation.confirmed_at)
    .bind(confirmation.auto_confirmed)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Writes a refunded escrow record (and optionally a new delivery status). Guarded on escrow still being held.
pub(crate) async fn write_refund(
    id: i64,
    escrow: &EscrowRecord,
    delivery_status: DeliveryStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SubOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE sub_orders SET
                held = $1,
                released = $2,
                refunded = $3,
                refunded_at = $4,
                refund_reason = $5,
                delivery_status = $6,
                updated_at = $7
            WHERE id = $8 AND held = 1 AND released = 0 AND refunded = 0
            RETURNING *;
        "#,
    )
    .bind(escrow.held)
    .bind(escrow.released)
    .bind(escrow.refunded)
    .bind(escrow.refunded_at)
    .bind(escrow.refund_reason.as_deref())
    .bind(delivery_status)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// The release itself. The whole release predicate is re-evaluated by the `WHERE` clause, atomically with the write.
pub(crate) async fn write_release(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SubOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE sub_orders SET
                held = 0,
                released = 1,
                released_at = $1,
                updated_at = $1
            WHERE id = $2
              AND held = 1 AND released = 0 AND refunded = 0
              AND delivery_status = 'Delivered'
              AND return_window IS NOT NULL AND return_window < $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn fetch_release_candidates(
    now: DateTime<Utc>,
    limit: i64,
    max_attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SubOrder>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT s.* FROM sub_orders s
            LEFT JOIN fund_releases f ON f.sub_order_id = s.id
            WHERE s.delivery_status = 'Delivered'
              AND s.held = 1 AND s.released = 0 AND s.refunded = 0
              AND s.return_window IS NOT NULL AND s.return_window < $1
              AND (f.id IS NULL OR f.attempts < $2)
            ORDER BY s.return_window ASC, s.id ASC
            LIMIT $3;
        "#,
    )
    .bind(now)
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(conn)
    .await
}

pub(crate) async fn fetch_refund_queue(
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<(Vec<SubOrder>, i64), sqlx::Error> {
    const PREDICATE: &str = " WHERE delivery_status IN ('Canceled', 'Failed Delivery') AND held = 1 AND released = 0 \
                             AND refunded = 0";
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM sub_orders");
    count.push(PREDICATE);
    let total = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::new("SELECT * FROM sub_orders");
    builder.push(PREDICATE);
    builder.push(" ORDER BY updated_at ASC, id ASC LIMIT ");
    builder.push_bind(pagination.limit());
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<SubOrder>().fetch_all(conn).await?;
    Ok((rows, total))
}
