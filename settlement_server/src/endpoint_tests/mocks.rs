use chrono::{DateTime, Utc};
use mockall::mock;
use settlement_common::Kobo;
use settlement_engine::{
    db_types::{FundRelease, NewWithdrawal, StoreId, SubOrder, Wallet, WalletTransaction, Withdrawal},
    settlement_api::query_objects::{
        FundReleaseDetail,
        FundReleaseQuery,
        Paginated,
        Pagination,
        StatusSummary,
        WithdrawalQuery,
    },
    traits::{
        ConfirmationSource,
        DeliveryUpdate,
        EscrowManagement,
        FundReleaseManagement,
        RefundOutcome,
        ReleaseOutcome,
        SettlementDbError,
        SubOrderChanged,
        WalletManagement,
    },
};

mock! {
    pub EscrowManager {}
    impl EscrowManagement for EscrowManager {
        async fn fetch_sub_order(&self, sub_order_id: i64) -> Result<Option<SubOrder>, SettlementDbError>;
        async fn update_delivery_status(&self, sub_order_id: i64, update: DeliveryUpdate, now: DateTime<Utc>) -> Result<SubOrderChanged, SettlementDbError>;
        async fn confirm_delivery(&self, sub_order_id: i64, source: &ConfirmationSource, now: DateTime<Utc>) -> Result<SubOrder, SettlementDbError>;
        async fn refund_escrow(&self, sub_order_id: i64, reason: &str, mark_returned: bool, now: DateTime<Utc>) -> Result<RefundOutcome, SettlementDbError>;
        async fn fetch_refund_queue(&self, pagination: Pagination) -> Result<Paginated<SubOrder>, SettlementDbError>;
    }
}

mock! {
    pub FundReleaseManager {}
    impl FundReleaseManagement for FundReleaseManager {
        async fn fetch_release_candidates(&self, now: DateTime<Utc>, limit: i64, max_attempts: i64) -> Result<Vec<SubOrder>, SettlementDbError>;
        async fn release_escrow(&self, sub_order_id: i64, now: DateTime<Utc>) -> Result<ReleaseOutcome, SettlementDbError>;
        async fn record_release_failure(&self, sub_order_id: i64, note: &str, now: DateTime<Utc>) -> Result<FundRelease, SettlementDbError>;
        async fn reverse_fund_release(&self, release_id: i64, note: &str, now: DateTime<Utc>) -> Result<(FundRelease, WalletTransaction), SettlementDbError>;
        async fn retry_fund_release(&self, release_id: i64, now: DateTime<Utc>) -> Result<FundRelease, SettlementDbError>;
        async fn fetch_fund_release_by_sub_order(&self, sub_order_id: i64) -> Result<Option<FundRelease>, SettlementDbError>;
        async fn search_fund_releases(&self, store_id: &StoreId, query: &FundReleaseQuery) -> Result<Paginated<FundRelease>, SettlementDbError>;
        async fn fund_release_summary(&self, store_id: &StoreId) -> Result<Vec<StatusSummary>, SettlementDbError>;
        async fn fetch_fund_release(&self, store_id: &StoreId, release_id: i64) -> Result<Option<FundReleaseDetail>, SettlementDbError>;
    }
}

mock! {
    pub WalletManager {}
    impl WalletManagement for WalletManager {
        async fn fetch_wallet(&self, store_id: &StoreId) -> Result<Option<Wallet>, SettlementDbError>;
        async fn fetch_wallet_transactions(&self, store_id: &StoreId, pagination: Pagination) -> Result<Paginated<WalletTransaction>, SettlementDbError>;
        async fn ledger_sum(&self, store_id: &StoreId) -> Result<Kobo, SettlementDbError>;
        async fn process_withdrawal(&self, withdrawal: NewWithdrawal, now: DateTime<Utc>) -> Result<(Withdrawal, WalletTransaction, Wallet), SettlementDbError>;
        async fn fetch_withdrawals(&self, store_id: &StoreId, query: &WithdrawalQuery) -> Result<Paginated<Withdrawal>, SettlementDbError>;
    }
}
