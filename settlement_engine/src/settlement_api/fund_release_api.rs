use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_common::Kobo;

use crate::{
    db_types::{FundRelease, StoreId, WalletTransaction},
    events::{EscrowReleasedEvent, EventProducers, FundReleaseFailedEvent},
    settlement_api::{
        errors::FundReleaseError,
        query_objects::{FundReleaseDetail, FundReleaseQuery, Paginated, StatusSummary},
    },
    traits::FundReleaseManagement,
    ErrorKind,
};

pub const DEFAULT_RELEASE_BATCH_SIZE: i64 = 100;
/// Automatic runs give up on a release after this many failed attempts. An administrator can retry it.
pub const DEFAULT_MAX_RELEASE_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct ReleasePolicy {
    pub batch_size: i64,
    pub max_attempts: i64,
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self { batch_size: DEFAULT_RELEASE_BATCH_SIZE, max_attempts: DEFAULT_MAX_RELEASE_ATTEMPTS }
    }
}

/// The tally of one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRunResult {
    /// Sub-orders whose escrow was released and credited in this run
    pub released: usize,
    /// Candidates that no longer qualified by the time their transaction ran
    pub skipped: usize,
    /// Candidates whose release failed. They are retried on the next run.
    pub failed: usize,
    pub released_amount: Kobo,
}

impl ReleaseRunResult {
    pub fn total(&self) -> usize {
        self.released + self.skipped + self.failed
    }
}

/// `FundReleaseApi` is the fund release scheduler and the read API over fund releases.
pub struct FundReleaseApi<B> {
    db: B,
    producers: EventProducers,
    policy: ReleasePolicy,
}

impl<B: Debug> Debug for FundReleaseApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FundReleaseApi ({:?}, {:?})", self.db, self.policy)
    }
}

impl<B> FundReleaseApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, policy: ReleasePolicy::default() }
    }

    pub fn with_policy(mut self, policy: ReleasePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl<B> FundReleaseApi<B>
where B: FundReleaseManagement
{
    /// One run of the release scheduler.
    ///
    /// Every sub-order whose return window closed before `now` is released in its own transaction, so one bad
    /// sub-order never holds up or rolls back the others. Failures are written to the sub-order's fund release and
    /// retried on the next run. The database backend re-checks the release predicate as part of each release, so a
    /// candidate that was refunded in the meantime is skipped rather than paid out.
    pub async fn run_release_cycle(&self, now: DateTime<Utc>) -> Result<ReleaseRunResult, FundReleaseError> {
        let candidates =
            self.db.fetch_release_candidates(now, self.policy.batch_size, self.policy.max_attempts).await?;
        trace!("💸️ {} sub-orders are due for release", candidates.len());
        let mut result = ReleaseRunResult::default();
        for candidate in candidates {
            let id = candidate.id;
            match self.db.release_escrow(id, now).await {
                Ok(outcome) => {
                    debug!(
                        "💸️ Released {} from sub-order #{id} to {}",
                        outcome.credit.amount, outcome.sub_order.store_id
                    );
                    result.released += 1;
                    result.released_amount = result.released_amount + outcome.credit.amount;
                    let event = EscrowReleasedEvent {
                        sub_order: outcome.sub_order,
                        release: outcome.release,
                        credit: outcome.credit,
                    };
                    self.producers.escrow_released(event).await;
                },
                Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::Validation) => {
                    debug!("💸️ Sub-order #{id} no longer qualifies for release: {e}");
                    result.skipped += 1;
                },
                Err(e) => {
                    if e.kind() == ErrorKind::InvariantViolation {
                        error!("💸️ Releasing sub-order #{id} violated an invariant: {e}");
                    } else {
                        warn!("💸️ Could not release sub-order #{id}: {e}");
                    }
                    result.failed += 1;
                    match self.db.record_release_failure(id, &e.to_string(), now).await {
                        Ok(release) => {
                            let event = FundReleaseFailedEvent { release, reason: e.to_string() };
                            self.producers.fund_release_failed(event).await;
                        },
                        Err(e2) => error!("💸️ Could not record the failed release of sub-order #{id}: {e2}"),
                    }
                },
            }
        }
        if result.total() > 0 {
            info!(
                "💸️ Release run complete. {} released ({}), {} skipped, {} failed",
                result.released, result.released_amount, result.skipped, result.failed
            );
        }
        Ok(result)
    }

    pub async fn list_fund_releases(
        &self,
        store_id: &StoreId,
        query: &FundReleaseQuery,
    ) -> Result<Paginated<FundRelease>, FundReleaseError> {
        trace!("💸️ Fetching fund releases for {store_id}: {query}");
        let page = self.db.search_fund_releases(store_id, query).await?;
        Ok(page)
    }

    pub async fn fund_release_summary(&self, store_id: &StoreId) -> Result<Vec<StatusSummary>, FundReleaseError> {
        let summary = self.db.fund_release_summary(store_id).await?;
        Ok(summary)
    }

    /// A store's fund release together with the sub-order it pays out. Another store's release is reported as not
    /// found.
    pub async fn fetch_fund_release(
        &self,
        store_id: &StoreId,
        release_id: i64,
    ) -> Result<FundReleaseDetail, FundReleaseError> {
        self.db.fetch_fund_release(store_id, release_id).await?.ok_or(FundReleaseError::NotFound(release_id))
    }

    /// Claws back a release: `released -> reversed`, debiting the store's wallet by the released amount.
    pub async fn reverse_release(
        &self,
        release_id: i64,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(FundRelease, WalletTransaction), FundReleaseError> {
        let (release, debit) = self.db.reverse_fund_release(release_id, note, now).await?;
        warn!("💸️ Fund release #{release_id} reversed. {} debited from {}: {note}", debit.amount, release.store_id);
        Ok((release, debit))
    }

    /// Puts a failed release back in line for the next automatic run.
    pub async fn retry_release(&self, release_id: i64, now: DateTime<Utc>) -> Result<FundRelease, FundReleaseError> {
        let release = self.db.retry_fund_release(release_id, now).await?;
        info!("💸️ Fund release #{release_id} will be retried on the next run");
        Ok(release)
    }
}
