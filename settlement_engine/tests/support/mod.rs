#![allow(dead_code)]
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use settlement_common::Kobo;
use settlement_engine::{
    db_types::{LineItem, NewOrder, NewSubOrder, OrderId, ShippingAddress, StoreId, SubOrder},
    events::EventProducers,
    test_utils::{
        fakes::{ScriptedGateway, StaticCatalog},
        prepare_env::fresh_database,
    },
    traits::{DeliveryUpdate, GatewayTransaction, OrderLookup},
    CheckoutApi,
    CheckoutPolicy,
    EscrowApi,
    EscrowManagement,
    FundReleaseApi,
    OrderManagement,
    PaymentVerifierApi,
    SettlementDatabase,
    SqliteDatabase,
    WalletApi,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

/// Day `n` of a test timeline, counted from a fixed midday.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::days(n)
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Obi".into(),
        address: "12 Marina Road".into(),
        city: "Lagos".into(),
        state: "Lagos".into(),
        country: "NG".into(),
        phone: Some("+2348000000000".into()),
    }
}

/// A single-store order with no shipping and no platform fee, so the whole sub-total settles to the store.
pub fn single_store_order(order_id: &str, buyer_id: &str, store_id: &str, amount: i64) -> NewOrder {
    let line = LineItem { product_id: format!("{store_id}-widget"), quantity: 1, unit_price: Kobo::from(amount), size: None };
    NewOrder {
        order_id: OrderId::from(order_id),
        buyer_id: buyer_id.into(),
        tx_ref: format!("settle-{order_id}-test"),
        shipping_address: address(),
        expires_at: day(0) + Duration::minutes(30),
        sub_orders: vec![NewSubOrder {
            store_id: StoreId::from(store_id),
            line_items: vec![line],
            shipping_method: None,
            sub_total: Kobo::from(amount),
            shipping_cost: Kobo::from(0),
            platform_fee: Kobo::from(0),
            settlement_amount: Kobo::from(amount),
        }],
    }
}

pub struct Harness {
    pub db: SqliteDatabase,
    pub catalog: StaticCatalog,
    pub gateway: ScriptedGateway,
    pub producers: EventProducers,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let db = fresh_database().await;
        Self { db, catalog: StaticCatalog::default(), gateway: ScriptedGateway::default(), producers }
    }

    /// Closes the connection pool and deletes the database file.
    pub async fn tear_down(self) {
        let Harness { mut db, .. } = self;
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(db.url()).await {
            warn!("🚀️ Failed to drop database {}: {e}", db.url());
        }
    }

    pub fn checkout(&self) -> CheckoutApi<SqliteDatabase, StaticCatalog, ScriptedGateway> {
        CheckoutApi::new(self.db.clone(), self.catalog.clone(), self.gateway.clone())
    }

    pub fn checkout_without_fees(&self) -> CheckoutApi<SqliteDatabase, StaticCatalog, ScriptedGateway> {
        let policy = CheckoutPolicy { platform_fee_bps: 0, ..CheckoutPolicy::default() };
        self.checkout().with_policy(policy)
    }

    pub fn verifier(&self) -> PaymentVerifierApi<SqliteDatabase, ScriptedGateway> {
        PaymentVerifierApi::new(self.db.clone(), self.gateway.clone(), self.producers.clone())
    }

    pub fn escrow(&self) -> EscrowApi<SqliteDatabase> {
        EscrowApi::new(self.db.clone(), self.producers.clone())
    }

    pub fn releases(&self) -> FundReleaseApi<SqliteDatabase> {
        FundReleaseApi::new(self.db.clone(), self.producers.clone())
    }

    pub fn wallets(&self) -> WalletApi<SqliteDatabase> {
        WalletApi::new(self.db.clone(), self.producers.clone())
    }

    /// Inserts a single-store order and marks it paid, returning its only sub-order.
    pub async fn paid_sub_order(&self, order_id: &str, store_id: &str, amount: i64) -> SubOrder {
        let order = single_store_order(order_id, "buyer-1", store_id, amount);
        let (order, _) = self.db.insert_order(order, day(0)).await.expect("Error inserting order");
        let change =
            self.db.mark_order_paid(&OrderLookup::OrderId(order.order_id.clone()), day(0)).await.expect("Error paying");
        assert!(change.changed);
        let sub_orders = self.db.fetch_sub_orders_for_order(&order.order_id).await.expect("Error fetching sub-orders");
        sub_orders.into_iter().next().expect("Order has no sub-orders")
    }

    /// A paid sub-order that the store marked delivered on `delivered_at`.
    pub async fn delivered_sub_order(
        &self,
        order_id: &str,
        store_id: &str,
        amount: i64,
        delivered_at: DateTime<Utc>,
    ) -> SubOrder {
        let sub_order = self.paid_sub_order(order_id, store_id, amount).await;
        let changed = self
            .db
            .update_delivery_status(sub_order.id, DeliveryUpdate::delivered_at(delivered_at), delivered_at)
            .await
            .expect("Error marking sub-order delivered");
        changed.new
    }

    /// A gateway transaction that pays `order_id` in full.
    pub async fn successful_transaction(&self, transaction_id: &str, order_id: &str) -> GatewayTransaction {
        let order = self.db.fetch_order(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
        let tx = GatewayTransaction {
            transaction_id: transaction_id.into(),
            status: "successful".into(),
            tx_ref: Some(order.tx_ref.clone()),
            amount: Some(order.total_amount),
            currency: Some("NGN".into()),
            order_id: Some(order.order_id.clone()),
        };
        self.gateway.set_transaction(tx.clone());
        tx
    }
}
