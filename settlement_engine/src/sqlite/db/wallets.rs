//! The wallet ledger. `wallets.balance` is a projection of `wallet_transactions`; the two are only ever written
//! together, inside the caller's transaction.
use chrono::{DateTime, Utc};
use log::trace;
use settlement_common::Kobo;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewWalletTransaction, NewWithdrawal, StoreId, Wallet, WalletTransaction, Withdrawal, WithdrawalStatus},
    settlement_api::query_objects::{Pagination, WithdrawalQuery},
};

pub async fn fetch_wallet(store_id: &StoreId, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM wallets WHERE store_id = $1").bind(store_id.as_str()).fetch_optional(conn).await
}

pub(crate) async fn ensure_wallet(
    store_id: &StoreId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO wallets (store_id, balance, created_at, updated_at) VALUES ($1, 0, $2, $2) ON CONFLICT \
         (store_id) DO NOTHING",
    )
    .bind(store_id.as_str())
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn credit(
    store_id: &StoreId,
    amount: Kobo,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    ensure_wallet(store_id, now, &mut *conn).await?;
    sqlx::query_as("UPDATE wallets SET balance = balance + $1, updated_at = $2 WHERE store_id = $3 RETURNING *")
        .bind(amount)
        .bind(now)
        .bind(store_id.as_str())
        .fetch_one(conn)
        .await
}

/// Debits the wallet only if the balance covers the amount. `None` means it does not (or the wallet does not
/// exist). The check and the write are one statement, so concurrent debits cannot both pass.
pub(crate) async fn guarded_debit(
    store_id: &StoreId,
    amount: Kobo,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE wallets SET balance = balance - $1, updated_at = $2 WHERE store_id = $3 AND balance >= $1 RETURNING *",
    )
    .bind(amount)
    .bind(now)
    .bind(store_id.as_str())
    .fetch_optional(conn)
    .await
}

pub(crate) async fn append_transaction(
    tx: NewWalletTransaction,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WalletTransaction, sqlx::Error> {
    let record: WalletTransaction = sqlx::query_as(
        r#"
            INSERT INTO wallet_transactions (store_id, tx_type, amount, source, order_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(tx.store_id.as_str())
    .bind(tx.tx_type)
    .bind(tx.amount)
    .bind(tx.source)
    .bind(tx.order_id.as_ref().map(|o| o.as_str()))
    .bind(&tx.description)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Ledger entry #{} appended: {} {} for {}", record.id, record.tx_type, record.amount, record.store_id);
    Ok(record)
}

pub async fn fetch_transactions(
    store_id: &StoreId,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<(Vec<WalletTransaction>, i64), sqlx::Error> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE store_id = $1")
        .bind(store_id.as_str())
        .fetch_one(&mut *conn)
        .await?;
    let rows = sqlx::query_as(
        "SELECT * FROM wallet_transactions WHERE store_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(store_id.as_str())
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(conn)
    .await?;
    Ok((rows, total))
}

pub async fn ledger_sum(store_id: &StoreId, conn: &mut SqliteConnection) -> Result<Kobo, sqlx::Error> {
    let sum: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(CASE WHEN tx_type = 'credit' THEN amount ELSE -amount END), 0)
            FROM wallet_transactions
            WHERE store_id = $1;
        "#,
    )
    .bind(store_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(Kobo::from(sum))
}

pub(crate) async fn insert_withdrawal(
    withdrawal: &NewWithdrawal,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO withdrawals (store_id, amount, fee, net_amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(withdrawal.store_id.as_str())
    .bind(withdrawal.amount)
    .bind(withdrawal.fee)
    .bind(withdrawal.net_amount())
    .bind(WithdrawalStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await
}

fn push_withdrawal_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, store_id: &'a StoreId, query: &WithdrawalQuery) {
    builder.push(" WHERE store_id = ");
    builder.push_bind(store_id.as_str());
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}

pub async fn fetch_withdrawals(
    store_id: &StoreId,
    query: &WithdrawalQuery,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Withdrawal>, i64), sqlx::Error> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM withdrawals");
    push_withdrawal_filters(&mut count, store_id, query);
    let total = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let pagination = query.pagination();
    let mut builder = QueryBuilder::new("SELECT * FROM withdrawals");
    push_withdrawal_filters(&mut builder, store_id, query);
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(pagination.limit());
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<Withdrawal>().fetch_all(conn).await?;
    Ok((rows, total))
}
