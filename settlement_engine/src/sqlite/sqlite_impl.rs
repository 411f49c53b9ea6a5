//! `SqliteDatabase` is the SQLite implementation of the settlement backend traits.
//!
//! Every method that moves money opens its own transaction with `pool.begin()`. An early return drops the
//! transaction, which rolls it back, so a failed step never leaves a partial write behind. Where a guarded write can
//! come first, it does: the write takes SQLite's write lock before anything is read, so concurrent callers queue up
//! behind the busy timeout instead of racing on a stale snapshot.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use settlement_common::Kobo;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{db_url, fund_releases, new_pool, orders, sub_orders, wallets};
use crate::{
    db_types::{
        DeliveryStatus,
        EscrowState,
        FundRelease,
        FundReleaseStatus,
        NewOrder,
        NewWalletTransaction,
        NewWithdrawal,
        Order,
        OrderId,
        PaymentStatus,
        StoreId,
        SubOrder,
        TransactionSource,
        Wallet,
        WalletTransaction,
        Withdrawal,
    },
    settlement_api::query_objects::{
        FundReleaseDetail,
        FundReleaseQuery,
        Paginated,
        Pagination,
        StatusSummary,
        WithdrawalQuery,
    },
    state_machine::{self, TransitionError},
    traits::{
        ConfirmationSource,
        DeliveryUpdate,
        EscrowManagement,
        FundReleaseManagement,
        OrderLookup,
        OrderManagement,
        PaymentStatusChange,
        RefundOutcome,
        ReleaseOutcome,
        SettlementDatabase,
        SettlementDbError,
        SubOrderChanged,
        WalletManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `SETTLE_DATABASE_URL` (or the default) as the database URL.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(
        &self,
        order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<SubOrder>), SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let saved = orders::insert_order(&order, now, &mut tx).await?;
        let mut saved_sub_orders = Vec::with_capacity(order.sub_orders.len());
        for sub_order in &order.sub_orders {
            let so = sub_orders::insert_sub_order(&saved.order_id, sub_order, now, &mut tx).await?;
            trace!("🗃️ Sub-order #{} for {} saved with {} in escrow", so.id, so.store_id, so.settlement_amount);
            saved_sub_orders.push(so);
        }
        tx.commit().await?;
        debug!(
            "🗃️ Order {} saved with {} sub-orders. Total {}, tx_ref {}",
            saved.order_id,
            saved_sub_orders.len(),
            saved.total_amount,
            saved.tx_ref
        );
        Ok((saved, saved_sub_orders))
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_tx_ref(&self, tx_ref: &str) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_tx_ref(tx_ref, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_sub_orders_for_order(&self, order_id: &OrderId) -> Result<Vec<SubOrder>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = sub_orders::fetch_sub_orders_for_order(order_id, &mut conn).await?;
        Ok(result)
    }

    async fn mark_order_paid(
        &self,
        lookup: &OrderLookup,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatusChange, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        if let Some(order) = orders::resolve_pending_order(lookup, PaymentStatus::Paid, None, now, &mut tx).await? {
            tx.commit().await?;
            debug!("🗃️ Order {} is now paid", order.order_id);
            return Ok(PaymentStatusChange::changed(order, PaymentStatus::Pending));
        }
        let order =
            orders::fetch_order(lookup, &mut tx).await?.ok_or_else(|| SettlementDbError::OrderNotFound(lookup.to_string()))?;
        match order.payment_status {
            PaymentStatus::Paid => {
                debug!("🗃️ Order {} was already paid. Nothing to do", order.order_id);
                Ok(PaymentStatusChange::unchanged(order))
            },
            PaymentStatus::Pending => Err(SettlementDbError::InvariantViolation(format!(
                "order {} is pending but the guarded update did not match it",
                order.order_id
            ))),
            status => Err(SettlementDbError::OrderAlreadyFinal { order_id: order.order_id, status }),
        }
    }

    async fn annul_pending_order(
        &self,
        lookup: &OrderLookup,
        status: PaymentStatus,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatusChange, SettlementDbError> {
        if !matches!(status, PaymentStatus::Failed | PaymentStatus::Cancelled) {
            return Err(SettlementDbError::InvariantViolation(format!("{status} is not an annulled status")));
        }
        let mut tx = self.pool.begin().await?;
        if let Some(order) = orders::resolve_pending_order(lookup, status, Some(expires_at), now, &mut tx).await? {
            tx.commit().await?;
            debug!("🗃️ Order {} is now {status}", order.order_id);
            return Ok(PaymentStatusChange::changed(order, PaymentStatus::Pending));
        }
        let order =
            orders::fetch_order(lookup, &mut tx).await?.ok_or_else(|| SettlementDbError::OrderNotFound(lookup.to_string()))?;
        if order.payment_status.is_terminal() {
            debug!("🗃️ Order {} is already {}. Leaving it alone", order.order_id, order.payment_status);
            Ok(PaymentStatusChange::unchanged(order))
        } else {
            Err(SettlementDbError::InvariantViolation(format!(
                "order {} is pending but the guarded update did not match it",
                order.order_id
            )))
        }
    }

    async fn expire_abandoned_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let expired = orders::cancel_expired_orders(now, &mut tx).await?;
        tx.commit().await?;
        Ok(expired)
    }
}

impl EscrowManagement for SqliteDatabase {
    async fn fetch_sub_order(&self, sub_order_id: i64) -> Result<Option<SubOrder>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let sub_order = sub_orders::fetch_sub_order(sub_order_id, &mut conn).await?;
        Ok(sub_order)
    }

    async fn update_delivery_status(
        &self,
        sub_order_id: i64,
        update: DeliveryUpdate,
        now: DateTime<Utc>,
    ) -> Result<SubOrderChanged, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let old = sub_orders::fetch_sub_order(sub_order_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::SubOrderNotFound(sub_order_id))?;
        let order = orders::fetch_order_by_order_id(&old.order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::OrderNotFound(old.order_id.to_string()))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(SettlementDbError::OrderNotPaid(order.order_id));
        }
        state_machine::check_delivery_transition(old.delivery_status, update.status, &old.escrow)?;
        let (delivery_date, return_window) = if update.status == DeliveryStatus::Delivered {
            let date = state_machine::delivery_date_for(update.delivery_date, old.created_at, now)?;
            (Some(date), Some(state_machine::return_window_for(date)))
        } else {
            (None, None)
        };
        let new = sub_orders::update_delivery_status(
            sub_order_id,
            old.delivery_status,
            update.status,
            delivery_date,
            return_window,
            now,
            &mut tx,
        )
        .await?
        .ok_or_else(|| SettlementDbError::ConcurrentModification(format!("Sub-order {sub_order_id}")))?;
        let fund_release = match return_window {
            Some(window) => Some(fund_releases::schedule_release(&new, window, now, &mut tx).await?),
            None => None,
        };
        tx.commit().await?;
        debug!("🗃️ Sub-order #{sub_order_id} moved from {} to {}", old.delivery_status, new.delivery_status);
        Ok(SubOrderChanged { old, new, fund_release })
    }

    async fn confirm_delivery(
        &self,
        sub_order_id: i64,
        source: &ConfirmationSource,
        now: DateTime<Utc>,
    ) -> Result<SubOrder, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let sub_order = sub_orders::fetch_sub_order(sub_order_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::SubOrderNotFound(sub_order_id))?;
        let confirmation = match source {
            ConfirmationSource::Customer { buyer_id } => {
                let order = orders::fetch_order_by_order_id(&sub_order.order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementDbError::OrderNotFound(sub_order.order_id.to_string()))?;
                if &order.buyer_id != buyer_id {
                    return Err(SettlementDbError::NotBuyer(order.order_id));
                }
                state_machine::customer_confirmation(&sub_order, now)
            },
            ConfirmationSource::Admin => state_machine::admin_confirmation(&sub_order, now),
        };
        let confirmation = match confirmation {
            Err(TransitionError::AlreadyConfirmed) => {
                debug!("🗃️ Delivery of sub-order #{sub_order_id} was already confirmed");
                return Ok(sub_order);
            },
            result => result?,
        };
        let updated = sub_orders::set_confirmation(sub_order_id, &confirmation, now, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::ConcurrentModification(format!("Sub-order {sub_order_id}")))?;
        if fund_releases::mark_ready(sub_order_id, now, &mut tx).await?.is_none() {
            warn!("🗃️ Sub-order #{sub_order_id} was confirmed, but it has no pending fund release to mark as ready");
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn refund_escrow(
        &self,
        sub_order_id: i64,
        reason: &str,
        mark_returned: bool,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let sub_order = sub_orders::fetch_sub_order(sub_order_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::SubOrderNotFound(sub_order_id))?;
        let buyer_id = orders::fetch_order_by_order_id(&sub_order.order_id, &mut tx)
            .await?
            .map(|o| o.buyer_id)
            .ok_or_else(|| SettlementDbError::OrderNotFound(sub_order.order_id.to_string()))?;
        let escrow = match state_machine::refunded_escrow(&sub_order.escrow, reason, now) {
            Ok(escrow) => escrow,
            Err(TransitionError::AlreadyRefunded) => {
                debug!("🗃️ Sub-order #{sub_order_id} has already been refunded");
                return Ok(RefundOutcome { sub_order, buyer_id, newly_refunded: false });
            },
            Err(e) => {
                if e.kind() == crate::ErrorKind::InvariantViolation {
                    error!("🗃️ Refund of sub-order #{sub_order_id} rejected: {e}");
                }
                return Err(e.into());
            },
        };
        let delivery_status = if mark_returned && sub_order.delivery_status != DeliveryStatus::Returned {
            state_machine::check_delivery_transition(sub_order.delivery_status, DeliveryStatus::Returned, &sub_order.escrow)?;
            DeliveryStatus::Returned
        } else {
            sub_order.delivery_status
        };
        let refunded = sub_orders::write_refund(sub_order_id, &escrow, delivery_status, now, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::ConcurrentModification(format!("Sub-order {sub_order_id}")))?;
        if fund_releases::fetch_by_sub_order(sub_order_id, &mut tx).await?.is_some() {
            let note = format!("Escrow refunded: {reason}");
            fund_releases::mark_failed(&refunded, &note, false, now, &mut tx).await?.ok_or_else(|| {
                SettlementDbError::InvariantViolation(format!(
                    "sub-order #{sub_order_id} was refunded but its fund release is already final"
                ))
            })?;
        }
        tx.commit().await?;
        debug!("🗃️ Escrow for sub-order #{sub_order_id} refunded ({reason})");
        Ok(RefundOutcome { sub_order: refunded, buyer_id, newly_refunded: true })
    }

    async fn fetch_refund_queue(&self, pagination: Pagination) -> Result<Paginated<SubOrder>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let (rows, total) = sub_orders::fetch_refund_queue(pagination, &mut conn).await?;
        Ok(Paginated::new(rows, pagination, total))
    }
}

impl FundReleaseManagement for SqliteDatabase {
    async fn fetch_release_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        max_attempts: i64,
    ) -> Result<Vec<SubOrder>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let candidates = sub_orders::fetch_release_candidates(now, limit, max_attempts, &mut conn).await?;
        Ok(candidates)
    }

    async fn release_escrow(&self, sub_order_id: i64, now: DateTime<Utc>) -> Result<ReleaseOutcome, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let sub_order = match sub_orders::write_release(sub_order_id, now, &mut tx).await? {
            Some(so) => so,
            None => {
                let current = sub_orders::fetch_sub_order(sub_order_id, &mut tx)
                    .await?
                    .ok_or(SettlementDbError::SubOrderNotFound(sub_order_id))?;
                return match state_machine::check_release(&current, now) {
                    Err(e) => {
                        if e.kind() == crate::ErrorKind::InvariantViolation {
                            error!("💸️ Refusing to release sub-order #{sub_order_id}: {e}");
                        }
                        Err(e.into())
                    },
                    Ok(()) => Err(SettlementDbError::InvariantViolation(format!(
                        "sub-order #{sub_order_id} satisfies the release predicate but the guarded update did not \
                         match it"
                    ))),
                };
            },
        };
        let release = match fund_releases::mark_released(&sub_order, now, &mut tx).await? {
            Some(r) => r,
            None => {
                let status = fund_releases::fetch_by_sub_order(sub_order_id, &mut tx)
                    .await?
                    .map(|r| r.status.to_string())
                    .unwrap_or_else(|| "missing".into());
                error!("💸️ Escrow for sub-order #{sub_order_id} was held, but its fund release is {status}");
                return Err(SettlementDbError::InvariantViolation(format!(
                    "fund release for held sub-order #{sub_order_id} is already {status}"
                )));
            },
        };
        if release.amount != sub_order.settlement_amount {
            error!(
                "💸️ Fund release #{} is for {}, but sub-order #{sub_order_id} settles {}",
                release.id, release.amount, sub_order.settlement_amount
            );
            return Err(SettlementDbError::InvariantViolation(format!(
                "fund release #{} amount does not match the settlement amount",
                release.id
            )));
        }
        let amount = sub_order.settlement_amount;
        let wallet = wallets::credit(&sub_order.store_id, amount, now, &mut tx).await?;
        let entry = NewWalletTransaction::credit(
            sub_order.store_id.clone(),
            amount,
            TransactionSource::Order,
            format!("Escrow release for sub-order #{sub_order_id}"),
        )
        .with_order_id(sub_order.order_id.clone());
        let credit = wallets::append_transaction(entry, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Released {amount} to {}. Wallet balance is now {}", sub_order.store_id, wallet.balance);
        Ok(ReleaseOutcome { sub_order, release, credit })
    }

    async fn record_release_failure(
        &self,
        sub_order_id: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<FundRelease, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let sub_order = sub_orders::fetch_sub_order(sub_order_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::SubOrderNotFound(sub_order_id))?;
        let release = match fund_releases::mark_failed(&sub_order, note, true, now, &mut tx).await? {
            Some(r) => r,
            None => {
                let from = fund_releases::fetch_by_sub_order(sub_order_id, &mut tx)
                    .await?
                    .map(|r| r.status)
                    .unwrap_or(FundReleaseStatus::Released);
                return Err(SettlementDbError::IllegalReleaseTransition { from, to: FundReleaseStatus::Failed });
            },
        };
        tx.commit().await?;
        Ok(release)
    }

    async fn reverse_fund_release(
        &self,
        release_id: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(FundRelease, WalletTransaction), SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let release = fund_releases::fetch_by_id(release_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::FundReleaseNotFound(release_id))?;
        if release.status != FundReleaseStatus::Released {
            return Err(SettlementDbError::IllegalReleaseTransition {
                from: release.status,
                to: FundReleaseStatus::Reversed,
            });
        }
        if wallets::guarded_debit(&release.store_id, release.amount, now, &mut tx).await?.is_none() {
            let available = wallets::fetch_wallet(&release.store_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
            return Err(SettlementDbError::InsufficientFunds {
                store_id: release.store_id,
                available,
                requested: release.amount,
            });
        }
        let entry = NewWalletTransaction::debit(
            release.store_id.clone(),
            release.amount,
            TransactionSource::Adjustment,
            format!("Reversal of fund release #{release_id}: {note}"),
        )
        .with_order_id(release.order_id.clone());
        let debit = wallets::append_transaction(entry, now, &mut tx).await?;
        let reversed = fund_releases::mark_reversed(release_id, note, now, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::ConcurrentModification(format!("Fund release {release_id}")))?;
        tx.commit().await?;
        Ok((reversed, debit))
    }

    async fn retry_fund_release(&self, release_id: i64, now: DateTime<Utc>) -> Result<FundRelease, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let release = fund_releases::fetch_by_id(release_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::FundReleaseNotFound(release_id))?;
        if release.status != FundReleaseStatus::Failed {
            return Err(SettlementDbError::IllegalReleaseTransition {
                from: release.status,
                to: FundReleaseStatus::Pending,
            });
        }
        let sub_order = sub_orders::fetch_sub_order(release.sub_order_id, &mut tx)
            .await?
            .ok_or(SettlementDbError::SubOrderNotFound(release.sub_order_id))?;
        if sub_order.escrow.refunded {
            return Err(TransitionError::EscrowClosed(EscrowState::Refunded).into());
        }
        let retried = fund_releases::reset_for_retry(release_id, now, &mut tx)
            .await?
            .ok_or_else(|| SettlementDbError::ConcurrentModification(format!("Fund release {release_id}")))?;
        tx.commit().await?;
        Ok(retried)
    }

    async fn fetch_fund_release_by_sub_order(
        &self,
        sub_order_id: i64,
    ) -> Result<Option<FundRelease>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let release = fund_releases::fetch_by_sub_order(sub_order_id, &mut conn).await?;
        Ok(release)
    }

    async fn search_fund_releases(
        &self,
        store_id: &StoreId,
        query: &FundReleaseQuery,
    ) -> Result<Paginated<FundRelease>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let (rows, total) = fund_releases::search(store_id, query, &mut conn).await?;
        Ok(Paginated::new(rows, query.pagination(), total))
    }

    async fn fund_release_summary(&self, store_id: &StoreId) -> Result<Vec<StatusSummary>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let summary = fund_releases::summary(store_id, &mut conn).await?;
        Ok(summary)
    }

    async fn fetch_fund_release(
        &self,
        store_id: &StoreId,
        release_id: i64,
    ) -> Result<Option<FundReleaseDetail>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let release = match fund_releases::fetch_by_id(release_id, &mut conn).await? {
            Some(r) if &r.store_id == store_id => r,
            _ => return Ok(None),
        };
        let sub_order = sub_orders::fetch_sub_order(release.sub_order_id, &mut conn)
            .await?
            .ok_or(SettlementDbError::SubOrderNotFound(release.sub_order_id))?;
        Ok(Some(FundReleaseDetail { release, sub_order }))
    }
}

impl WalletManagement for SqliteDatabase {
    async fn fetch_wallet(&self, store_id: &StoreId) -> Result<Option<Wallet>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(store_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn fetch_wallet_transactions(
        &self,
        store_id: &StoreId,
        pagination: Pagination,
    ) -> Result<Paginated<WalletTransaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let (rows, total) = wallets::fetch_transactions(store_id, pagination, &mut conn).await?;
        Ok(Paginated::new(rows, pagination, total))
    }

    async fn ledger_sum(&self, store_id: &StoreId) -> Result<Kobo, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let sum = wallets::ledger_sum(store_id, &mut conn).await?;
        Ok(sum)
    }

    async fn process_withdrawal(
        &self,
        withdrawal: NewWithdrawal,
        now: DateTime<Utc>,
    ) -> Result<(Withdrawal, WalletTransaction, Wallet), SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let wallet = match wallets::guarded_debit(&withdrawal.store_id, withdrawal.amount, now, &mut tx).await? {
            Some(w) => w,
            None => {
                let available =
                    wallets::fetch_wallet(&withdrawal.store_id, &mut tx).await?.map(|w| w.balance).unwrap_or_default();
                debug!(
                    "🗃️ Withdrawal of {} from {} refused. Balance is {available}",
                    withdrawal.amount, withdrawal.store_id
                );
                return Err(SettlementDbError::InsufficientFunds {
                    store_id: withdrawal.store_id,
                    available,
                    requested: withdrawal.amount,
                });
            },
        };
        let entry = NewWalletTransaction::debit(
            withdrawal.store_id.clone(),
            withdrawal.amount,
            TransactionSource::Withdrawal,
            format!("Withdrawal of {} (fee {}, net {})", withdrawal.amount, withdrawal.fee, withdrawal.net_amount()),
        );
        let debit = wallets::append_transaction(entry, now, &mut tx).await?;
        let record = wallets::insert_withdrawal(&withdrawal, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Withdrawal #{} of {} recorded for {}", record.id, record.amount, record.store_id);
        Ok((record, debit, wallet))
    }

    async fn fetch_withdrawals(
        &self,
        store_id: &StoreId,
        query: &WithdrawalQuery,
    ) -> Result<Paginated<Withdrawal>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let (rows, total) = wallets::fetch_withdrawals(store_id, query, &mut conn).await?;
        Ok(Paginated::new(rows, query.pagination(), total))
    }
}
