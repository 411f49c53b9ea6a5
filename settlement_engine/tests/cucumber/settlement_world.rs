use chrono::{DateTime, Duration, TimeZone, Utc};
use cucumber::World;
use log::*;
use settlement_engine::{
    db_types::{OrderId, SubOrder},
    events::EventProducers,
    test_utils::{
        fakes::ScriptedGateway,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    EscrowApi,
    ErrorKind,
    FundReleaseApi,
    OrderManagement,
    PaymentVerifierApi,
    SqliteDatabase,
    WalletApi,
};

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<SettlementSystem>,
}

#[derive(Debug)]
pub struct SettlementSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: ScriptedGateway,
    /// The kind of the error returned by the last step that was allowed to fail
    pub last_error: Option<ErrorKind>,
}

impl SettlementWorld {
    pub fn system(&self) -> &SettlementSystem {
        self.system.as_ref().expect("Settlement system not initialised")
    }

    pub fn system_mut(&mut self) -> &mut SettlementSystem {
        self.system.as_mut().expect("Settlement system not initialised")
    }
}

impl SettlementSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        Self { db_path: url, db, gateway: ScriptedGateway::default(), last_error: None }
    }

    pub fn escrow(&self) -> EscrowApi<SqliteDatabase> {
        EscrowApi::new(self.db.clone(), EventProducers::default())
    }

    pub fn releases(&self) -> FundReleaseApi<SqliteDatabase> {
        FundReleaseApi::new(self.db.clone(), EventProducers::default())
    }

    pub fn wallets(&self) -> WalletApi<SqliteDatabase> {
        WalletApi::new(self.db.clone(), EventProducers::default())
    }

    pub fn verifier(&self) -> PaymentVerifierApi<SqliteDatabase, ScriptedGateway> {
        PaymentVerifierApi::new(self.db.clone(), self.gateway.clone(), EventProducers::default())
    }

    /// The first sub-order of `order_id`. Scenario orders have a single store.
    pub async fn sub_order(&self, order_id: &str) -> SubOrder {
        let sub_orders =
            self.db.fetch_sub_orders_for_order(&OrderId::from(order_id)).await.expect("Error fetching sub-orders");
        sub_orders.into_iter().next().unwrap_or_else(|| panic!("Order {order_id} has no sub-orders"))
    }
}

/// Day `n` of a scenario's timeline.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::days(n)
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
