use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_common::Kobo;

use crate::{
    db_types::{NewWithdrawal, StoreId, WalletTransaction, Withdrawal},
    events::{EventProducers, WithdrawalRequestedEvent},
    settlement_api::{
        errors::WalletError,
        query_objects::{Paginated, Pagination, WithdrawalQuery},
    },
    traits::WalletManagement,
};

pub const DEFAULT_MIN_WITHDRAWAL: i64 = 100_000;
pub const DEFAULT_MAX_WITHDRAWAL: i64 = 10_000_000;
pub const DEFAULT_WITHDRAWAL_FEE_BPS: i64 = 150;
pub const DEFAULT_WITHDRAWAL_FEE_FIXED: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPolicy {
    pub min_amount: Kobo,
    pub max_amount: Kobo,
    /// Percentage part of the fee, in basis points of the gross amount
    pub fee_bps: i64,
    pub fixed_fee: Kobo,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: Kobo::from(DEFAULT_MIN_WITHDRAWAL),
            max_amount: Kobo::from(DEFAULT_MAX_WITHDRAWAL),
            fee_bps: DEFAULT_WITHDRAWAL_FEE_BPS,
            fixed_fee: Kobo::from(DEFAULT_WITHDRAWAL_FEE_FIXED),
        }
    }
}

impl WithdrawalPolicy {
    /// Checks the bounds and works out the fee. The net payout (`amount - fee`) must be positive.
    pub fn quote(&self, store_id: StoreId, amount: Kobo) -> Result<NewWithdrawal, WalletError> {
        if amount < self.min_amount {
            return Err(WalletError::BelowMinimum { min: self.min_amount, requested: amount });
        }
        if amount > self.max_amount {
            return Err(WalletError::AboveMaximum { max: self.max_amount, requested: amount });
        }
        let fee = amount.basis_points(self.fee_bps) + self.fixed_fee;
        if fee >= amount {
            return Err(WalletError::FeeExceedsAmount { amount, fee });
        }
        Ok(NewWithdrawal { store_id, amount, fee })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub store_id: StoreId,
    pub balance: Kobo,
}

/// The cached wallet balance compared with the ledger it is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub store_id: StoreId,
    pub cached: Kobo,
    pub ledger_sum: Kobo,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub withdrawal: Withdrawal,
    pub debit: WalletTransaction,
    pub new_balance: Kobo,
}

/// `WalletApi` reads store wallets and their ledgers, and takes withdrawal requests.
pub struct WalletApi<B> {
    db: B,
    producers: EventProducers,
    policy: WithdrawalPolicy,
}

impl<B: Debug> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi ({:?})", self.db)
    }
}

impl<B> WalletApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, policy: WithdrawalPolicy::default() }
    }

    pub fn with_policy(mut self, policy: WithdrawalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &WithdrawalPolicy {
        &self.policy
    }
}

impl<B> WalletApi<B>
where B: WalletManagement
{
    /// A store that has never been credited has a zero balance.
    pub async fn balance(&self, store_id: &StoreId) -> Result<WalletBalance, WalletError> {
        let balance = self.db.fetch_wallet(store_id).await?.map(|w| w.balance).unwrap_or_default();
        Ok(WalletBalance { store_id: store_id.clone(), balance })
    }

    pub async fn history(
        &self,
        store_id: &StoreId,
        pagination: Pagination,
    ) -> Result<Paginated<WalletTransaction>, WalletError> {
        let page = self.db.fetch_wallet_transactions(store_id, pagination).await?;
        Ok(page)
    }

    /// Checks that the cached balance equals the signed sum of the ledger. A mismatch is a bug and is logged as an
    /// error, but nothing is corrected automatically.
    pub async fn reconcile(&self, store_id: &StoreId) -> Result<Reconciliation, WalletError> {
        let cached = self.db.fetch_wallet(store_id).await?.map(|w| w.balance).unwrap_or_default();
        let ledger_sum = self.db.ledger_sum(store_id).await?;
        let consistent = cached == ledger_sum;
        if consistent {
            trace!("👛️ Wallet for {store_id} reconciles at {cached}");
        } else {
            error!("👛️ Wallet for {store_id} is out of balance. Cached: {cached}, ledger: {ledger_sum}");
        }
        Ok(Reconciliation { store_id: store_id.clone(), cached, ledger_sum, consistent })
    }

    /// Requests a payout of `amount` (gross, fee included).
    ///
    /// The bounds and fee are checked first; a rejected request changes nothing. The wallet debit, the ledger entry
    /// and the payout record are then written in one transaction.
    pub async fn request_withdrawal(
        &self,
        store_id: &StoreId,
        amount: Kobo,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalReceipt, WalletError> {
        let withdrawal = self.policy.quote(store_id.clone(), amount).map_err(|e| {
            debug!("👛️ Withdrawal of {amount} for {store_id} rejected: {e}");
            e
        })?;
        let (withdrawal, debit, wallet) = self.db.process_withdrawal(withdrawal, now).await?;
        info!(
            "👛️ Withdrawal #{} of {} (fee {}) recorded for {store_id}. Balance is now {}",
            withdrawal.id, withdrawal.amount, withdrawal.fee, wallet.balance
        );
        let receipt = WithdrawalReceipt { withdrawal, debit, new_balance: wallet.balance };
        let event = WithdrawalRequestedEvent {
            withdrawal: receipt.withdrawal.clone(),
            debit: receipt.debit.clone(),
            new_balance: receipt.new_balance,
        };
        self.producers.withdrawal_requested(event).await;
        Ok(receipt)
    }

    pub async fn list_withdrawals(
        &self,
        store_id: &StoreId,
        query: &WithdrawalQuery,
    ) -> Result<Paginated<Withdrawal>, WalletError> {
        let page = self.db.fetch_withdrawals(store_id, query).await?;
        Ok(page)
    }
}
