use std::time::Duration;

use chrono::Utc;
use log::*;
use settlement_engine::{
    db_types::Order,
    events::EventProducers,
    FundReleaseApi,
    PaymentVerifierApi,
    ReleasePolicy,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::integrations::flutterwave::FlutterwaveGateway;

/// Starts the settlement worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval` (and once on start-up) the worker:
/// 1. Releases the escrow of every delivered sub-order whose return window has closed.
/// 2. Cancels pending orders whose payment window has passed.
///
/// Failures are logged and the worker carries on. Releases that failed are picked up again on the next tick.
pub fn start_settlement_worker(
    db: SqliteDatabase,
    gateway: FlutterwaveGateway,
    producers: EventProducers,
    interval: Duration,
    policy: ReleasePolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let releases = FundReleaseApi::new(db.clone(), producers.clone()).with_policy(policy);
        let payments = PaymentVerifierApi::new(db, gateway, producers);
        info!("🕰️ Settlement worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            info!("🕰️ Running fund release job");
            match releases.run_release_cycle(Utc::now()).await {
                Ok(result) => {
                    info!(
                        "🕰️ Fund release job complete. {} released ({}), {} skipped, {} failed",
                        result.released, result.released_amount, result.skipped, result.failed
                    );
                },
                Err(e) => {
                    error!("🕰️ Error running fund release job: {e}");
                },
            }
            match payments.expire_abandoned_orders(Utc::now()).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No abandoned orders"),
                Ok(expired) => {
                    info!("🕰️ {} abandoned orders cancelled", expired.len());
                    debug!("🕰️ Cancelled orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running abandoned order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} buyer_id: {}", o.id, o.order_id, o.buyer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
