use chrono::{DateTime, Utc};

use crate::{
    db_types::{FundRelease, StoreId, SubOrder, WalletTransaction},
    settlement_api::query_objects::{FundReleaseDetail, FundReleaseQuery, Paginated, StatusSummary},
    traits::{ReleaseOutcome, SettlementDbError},
};

#[allow(async_fn_in_trait)]
pub trait FundReleaseManagement {
    /// Sub-orders satisfying the release predicate (`Delivered`, escrow held, return window before `now`), oldest
    /// return window first. Sub-orders whose fund release has failed `max_attempts` times or more are left out.
    async fn fetch_release_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        max_attempts: i64,
    ) -> Result<Vec<SubOrder>, SettlementDbError>;

    /// Releases one sub-order's escrow in its own transaction:
    ///
    /// 1. a guarded update flips the escrow flags only if the release predicate still holds,
    /// 2. the fund release is marked `released` (and created if it is missing),
    /// 3. the store's wallet is credited and the matching ledger entry appended.
    ///
    /// If the predicate no longer holds, nothing is written and the reason is returned as
    /// [`SettlementDbError::Transition`].
    async fn release_escrow(&self, sub_order_id: i64, now: DateTime<Utc>) -> Result<ReleaseOutcome, SettlementDbError>;

    /// Marks the sub-order's fund release `failed`, increments its attempt counter and appends `note` to its admin
    /// notes.
    async fn record_release_failure(
        &self,
        sub_order_id: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<FundRelease, SettlementDbError>;

    /// Compensating action: `released -> reversed`, debiting the store wallet by the released amount.
    async fn reverse_fund_release(
        &self,
        release_id: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(FundRelease, WalletTransaction), SettlementDbError>;

    /// `failed -> pending`, resetting the attempt counter so automatic runs pick the release up again.
    async fn retry_fund_release(&self, release_id: i64, now: DateTime<Utc>) -> Result<FundRelease, SettlementDbError>;

    async fn fetch_fund_release_by_sub_order(&self, sub_order_id: i64)
        -> Result<Option<FundRelease>, SettlementDbError>;

    async fn search_fund_releases(
        &self,
        store_id: &StoreId,
        query: &FundReleaseQuery,
    ) -> Result<Paginated<FundRelease>, SettlementDbError>;

    async fn fund_release_summary(&self, store_id: &StoreId) -> Result<Vec<StatusSummary>, SettlementDbError>;

    async fn fetch_fund_release(
        &self,
        store_id: &StoreId,
        release_id: i64,
    ) -> Result<Option<FundReleaseDetail>, SettlementDbError>;
}
