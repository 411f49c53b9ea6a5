use chrono::{DateTime, Utc};
use settlement_common::Kobo;

use crate::{
    db_types::{NewWithdrawal, StoreId, Wallet, WalletTransaction, Withdrawal},
    settlement_api::query_objects::{Paginated, Pagination, WithdrawalQuery},
    traits::SettlementDbError,
};

/// The store wallet ledger.
///
/// The cached balance on [`Wallet`] is only ever changed in the same transaction that appends the matching
/// [`WalletTransaction`].
#[allow(async_fn_in_trait)]
pub trait WalletManagement {
    async fn fetch_wallet(&self, store_id: &StoreId) -> Result<Option<Wallet>, SettlementDbError>;

    /// Newest first.
    async fn fetch_wallet_transactions(
        &self,
        store_id: &StoreId,
        pagination: Pagination,
    ) -> Result<Paginated<WalletTransaction>, SettlementDbError>;

    /// The signed sum of every ledger entry for the store.
    async fn ledger_sum(&self, store_id: &StoreId) -> Result<Kobo, SettlementDbError>;

    /// Debits the gross amount, appends the debit, and records the payout, in one transaction.
    ///
    /// The debit is guarded on the balance covering it, so concurrent withdrawals can never overdraw the wallet:
    /// the loser gets [`SettlementDbError::InsufficientFunds`].
    async fn process_withdrawal(
        &self,
        withdrawal: NewWithdrawal,
        now: DateTime<Utc>,
    ) -> Result<(Withdrawal, WalletTransaction, Wallet), SettlementDbError>;

    async fn fetch_withdrawals(
        &self,
        store_id: &StoreId,
        query: &WithdrawalQuery,
    ) -> Result<Paginated<Withdrawal>, SettlementDbError>;
}
