use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde_json::json;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use super::timestamped_note;
use crate::{
    db_types::{FundRelease, FundReleaseStatus, StoreId, SubOrder},
    settlement_api::query_objects::{FundReleaseQuery, StatusSummary},
};

/// Appends `excluded.admin_notes` to the existing notes, one entry per line.
const APPEND_NOTE: &str = "CASE WHEN fund_releases.admin_notes IS NULL OR fund_releases.admin_notes = '' THEN \
                           excluded.admin_notes ELSE fund_releases.admin_notes || char(10) || excluded.admin_notes END";

fn release_metadata(sub_order: &SubOrder) -> Json<serde_json::Value> {
    Json(json!({
        "sub_total": sub_order.sub_total,
        "shipping_cost": sub_order.shipping_cost,
        "platform_fee": sub_order.platform_fee,
        "delivery_date": sub_order.delivery_date,
    }))
}

/// Creates the pending fund release for a sub-order that has just been delivered. Calling it again for the same
/// sub-order leaves the existing record untouched.
pub(crate) async fn schedule_release(
    sub_order: &SubOrder,
    scheduled_release_time: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<FundRelease, sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO fund_releases (
                order_id,
                sub_order_id,
                store_id,
                amount,
                status,
                scheduled_release_time,
                metadata,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $7)
            ON CONFLICT (sub_order_id) DO NOTHING;
        "#,
    )
    .bind(sub_order.order_id.as_str())
    .bind(sub_order.id)
    .bind(sub_order.store_id.as_str())
    .bind(sub_order.settlement_amount)
    .bind(scheduled_release_time)
    .bind(release_metadata(sub_order))
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let release = sqlx::query_as("SELECT * FROM fund_releases WHERE sub_order_id = $1")
        .bind(sub_order.id)
        .fetch_one(conn)
        .await?;
    Ok(release)
}

pub(crate) async fn mark_ready(
    sub_order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE fund_releases SET status = 'ready', updated_at = $1 WHERE sub_order_id = $2 AND status = 'pending' \
         RETURNING *",
    )
    .bind(now)
    .bind(sub_order_id)
    .fetch_optional(conn)
    .await
}

/// Marks the sub-order's release as `released`, creating the record if it is missing. Returns `None` if the existing
/// record is already `released` or `reversed`.
pub(crate) async fn mark_released(
    sub_order: &SubOrder,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, sqlx::Error> {
    let scheduled = sub_order.return_window.unwrap_or(now);
    sqlx::query_as(
        r#"
            INSERT INTO fund_releases (
                order_id,
                sub_order_id,
                store_id,
                amount,
                status,
                scheduled_release_time,
                actual_released_at,
                metadata,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'released', $5, $6, $7, $6, $6)
            ON CONFLICT (sub_order_id) DO UPDATE SET
                status = 'released',
                actual_released_at = excluded.actual_released_at,
                updated_at = excluded.updated_at
            WHERE fund_releases.status IN ('pending', 'ready', 'processing', 'failed')
            RETURNING *;
        "#,
    )
    .bind(sub_order.order_id.as_str())
    .bind(sub_order.id)
    .bind(sub_order.store_id.as_str())
    .bind(sub_order.settlement_amount)
    .bind(scheduled)
    .bind(now)
    .bind(release_metadata(sub_order))
    .fetch_optional(conn)
    .await
}

/// Marks the sub-order's release as `failed` and appends a note, creating the record if it is missing. When
/// `count_attempt` is set the attempt counter goes up by one. Returns `None` if the release is already final.
pub(crate) async fn mark_failed(
    sub_order: &SubOrder,
    note: &str,
    count_attempt: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, sqlx::Error> {
    let attempts = i64::from(count_attempt);
    let scheduled = sub_order.return_window.unwrap_or(now);
    let sql = format!(
        r#"
            INSERT INTO fund_releases (
                order_id,
                sub_order_id,
                store_id,
                amount,
                status,
                scheduled_release_time,
                admin_notes,
                metadata,
                attempts,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'failed', $5, $6, $7, $8, $9, $9)
            ON CONFLICT (sub_order_id) DO UPDATE SET
                status = 'failed',
                admin_notes = {APPEND_NOTE},
                attempts = fund_releases.attempts + excluded.attempts,
                updated_at = excluded.updated_at
            WHERE fund_releases.status NOT IN ('released', 'reversed')
            RETURNING *;
        "#
    );
    let release = sqlx::query_as(&sql)
        .bind(sub_order.order_id.as_str())
        .bind(sub_order.id)
        .bind(sub_order.store_id.as_str())
        .bind(sub_order.settlement_amount)
        .bind(scheduled)
        .bind(timestamped_note(note, now))
        .bind(release_metadata(sub_order))
        .bind(attempts)
        .bind(now)
        .fetch_optional(conn)
        .await?;
    debug!("🗃️ Fund release for sub-order {} marked as failed: {note}", sub_order.id);
    Ok(release)
}

pub(crate) async fn mark_reversed(
    release_id: i64,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE fund_releases SET
                status = 'reversed',
                admin_notes = CASE WHEN admin_notes IS NULL OR admin_notes = '' THEN $1
                                   ELSE admin_notes || char(10) || $1 END,
                updated_at = $2
            WHERE id = $3 AND status = 'released'
            RETURNING *;
        "#,
    )
    .bind(timestamped_note(note, now))
    .bind(now)
    .bind(release_id)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn reset_for_retry(
    release_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE fund_releases SET status = 'pending', attempts = 0, updated_at = $1 WHERE id = $2 AND status = \
         'failed' RETURNING *",
    )
    .bind(now)
    .bind(release_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_by_id(release_id: i64, conn: &mut SqliteConnection) -> Result<Option<FundRelease>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fund_releases WHERE id = $1").bind(release_id).fetch_optional(conn).await
}

pub async fn fetch_by_sub_order(
    sub_order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<FundRelease>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fund_releases WHERE sub_order_id = $1").bind(sub_order_id).fetch_optional(conn).await
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, store_id: &'a StoreId, query: &'a FundReleaseQuery) {
    builder.push(" WHERE store_id = ");
    builder.push_bind(store_id.as_str());
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(order_id) = &query.order_id {
        builder.push(" AND order_id = ");
        builder.push_bind(order_id.as_str());
    }
}

/// Fetches a store's fund releases matching the query, along with the total number of matches.
pub async fn search(
    store_id: &StoreId,
    query: &FundReleaseQuery,
    conn: &mut SqliteConnection,
) -> Result<(Vec<FundRelease>, i64), sqlx::Error> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM fund_releases");
    push_filters(&mut count, store_id, query);
    let total = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let pagination = query.pagination();
    let mut builder = QueryBuilder::new("SELECT * FROM fund_releases");
    push_filters(&mut builder, store_id, query);
    // Sort column and direction come from closed enums, never from user text
    builder.push(format!(" ORDER BY {} {}, id {}", query.sort_by.column(), query.sort_dir.sql(), query.sort_dir.sql()));
    builder.push(" LIMIT ");
    builder.push_bind(pagination.limit());
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let releases = builder.build_query_as::<FundRelease>().fetch_all(conn).await?;
    trace!("🗃️ {} of {total} fund releases returned for {query}", releases.len());
    Ok((releases, total))
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    status: FundReleaseStatus,
    count: i64,
    total_amount: i64,
}

/// Per-status counts and totals for a store. Statuses with no releases are reported with zeros.
pub async fn summary(store_id: &StoreId, conn: &mut SqliteConnection) -> Result<Vec<StatusSummary>, sqlx::Error> {
    let rows: Vec<SummaryRow> = sqlx::query_as(
        r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total_amount
            FROM fund_releases
            WHERE store_id = $1
            GROUP BY status;
        "#,
    )
    .bind(store_id.as_str())
    .fetch_all(conn)
    .await?;
    let result = FundReleaseStatus::all()
        .into_iter()
        .map(|status| {
            let row = rows.iter().find(|r| r.status == status);
            StatusSummary {
                status,
                count: row.map(|r| r.count).unwrap_or_default(),
                total_amount: row.map(|r| r.total_amount).unwrap_or_default().into(),
            }
        })
        .collect();
    Ok(result)
}
