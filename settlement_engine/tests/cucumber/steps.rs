use chrono::Duration;
use cucumber::{given, then, when};
use settlement_common::Kobo;
use settlement_engine::{
    db_types::{DeliveryStatus, LineItem, NewOrder, NewSubOrder, OrderId, ShippingAddress, StoreId},
    settlement_api::query_objects::Pagination,
    traits::{DeliveryUpdate, GatewayTransaction, OrderLookup},
    ErrorKind,
    FundReleaseManagement,
    OrderManagement,
    PaymentReference,
};

use crate::cucumber::{settlement_world::day, SettlementWorld};

fn new_order(order_id: &str, buyer_id: &str, store_id: &str, amount: i64) -> NewOrder {
    let line = LineItem { product_id: "widget".into(), quantity: 1, unit_price: Kobo::from(amount), size: None };
    NewOrder {
        order_id: OrderId::from(order_id),
        buyer_id: buyer_id.into(),
        tx_ref: format!("settle-{order_id}-cucumber"),
        shipping_address: ShippingAddress { full_name: buyer_id.into(), country: "NG".into(), ..Default::default() },
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

fn record<T, E>(world: &mut SettlementWorld, result: Result<T, E>, kind: impl Fn(&E) -> ErrorKind) {
    world.system_mut().last_error = result.as_ref().err().map(kind);
}

#[given(expr = "a pending order {word} from buyer '{word}' to store '{word}' for {int} kobo")]
async fn pending_order(world: &mut SettlementWorld, order_id: String, buyer_id: String, store_id: String, amount: i64) {
    let order = new_order(&order_id, &buyer_id, &store_id, amount);
    world.system().db.insert_order(order, day(0)).await.expect("Error inserting order");
}

#[given(expr = "a paid order {word} from buyer '{word}' to store '{word}' for {int} kobo")]
async fn paid_order(world: &mut SettlementWorld, order_id: String, buyer_id: String, store_id: String, amount: i64) {
    pending_order(world, order_id.clone(), buyer_id, store_id, amount).await;
    let lookup = OrderLookup::OrderId(OrderId::from(order_id));
    world.system().db.mark_order_paid(&lookup, day(0)).await.expect("Error paying order");
}

#[when(expr = "the delivery status of order {word} becomes {string} on day {int}")]
async fn update_delivery(world: &mut SettlementWorld, order_id: String, status: String, d: i64) {
    let status = status.parse::<DeliveryStatus>().expect("Not a delivery status");
    let update = match status {
        DeliveryStatus::Delivered => DeliveryUpdate::delivered_at(day(d)),
        s => DeliveryUpdate::new(s),
    };
    let sub_order = world.system().sub_order(&order_id).await;
    let result = world.system().escrow().update_delivery_status(sub_order.id, update, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "buyer '{word}' confirms delivery of order {word} on day {int}")]
async fn buyer_confirms(world: &mut SettlementWorld, buyer_id: String, order_id: String, d: i64) {
    let sub_order = world.system().sub_order(&order_id).await;
    let result = world.system().escrow().confirm_delivery(sub_order.id, &buyer_id, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "an administrator confirms delivery of order {word} on day {int}")]
async fn admin_confirms(world: &mut SettlementWorld, order_id: String, d: i64) {
    let sub_order = world.system().sub_order(&order_id).await;
    let result = world.system().escrow().admin_confirm_delivery(sub_order.id, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "the return of order {word} is approved on day {int} because {string}")]
async fn approve_return(world: &mut SettlementWorld, order_id: String, d: i64, reason: String) {
    let sub_order = world.system().sub_order(&order_id).await;
    let result = world.system().escrow().approve_return(sub_order.id, &reason, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "the refund of order {word} is approved on day {int} because {string}")]
async fn approve_refund(world: &mut SettlementWorld, order_id: String, d: i64, reason: String) {
    let sub_order = world.system().sub_order(&order_id).await;
    let result = world.system().escrow().approve_queued_refund(sub_order.id, &reason, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "the release scheduler runs on day {int}")]
async fn run_scheduler(world: &mut SettlementWorld, d: i64) {
    world.system().releases().run_release_cycle(day(d)).await.expect("Error running the release scheduler");
}

#[when(expr = "store '{word}' requests a withdrawal of {int} kobo on day {int}")]
async fn request_withdrawal(world: &mut SettlementWorld, store_id: String, amount: i64, d: i64) {
    let store = StoreId::from(store_id);
    let result = world.system().wallets().request_withdrawal(&store, Kobo::from(amount), day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "the gateway reports transaction {word} for order {word} as {word}")]
async fn gateway_reports(world: &mut SettlementWorld, transaction_id: String, order_id: String, status: String) {
    let order = world.system().db.fetch_order(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
    world.system().gateway.set_transaction(GatewayTransaction {
        transaction_id,
        status,
        tx_ref: Some(order.tx_ref.clone()),
        amount: Some(order.total_amount),
        currency: Some("NGN".into()),
        order_id: Some(order.order_id.clone()),
    });
}

#[when(expr = "transaction {word} is finalized on day {int}")]
async fn finalize(world: &mut SettlementWorld, transaction_id: String, d: i64) {
    let result = world.system().verifier().finalize(&transaction_id, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "transaction {word} is verified on day {int}")]
async fn verify(world: &mut SettlementWorld, transaction_id: String, d: i64) {
    let reference = PaymentReference::TransactionId(transaction_id);
    let result = world.system().verifier().verify(&reference, day(d)).await;
    record(world, result, |e| e.kind());
}

#[when(expr = "abandoned orders are expired on day {int}")]
async fn expire_orders(world: &mut SettlementWorld, d: i64) {
    world.system().verifier().expire_abandoned_orders(day(d)).await.expect("Error expiring orders");
}

#[then(expr = "the request succeeds")]
async fn request_succeeds(world: &mut SettlementWorld) {
    assert_eq!(world.system().last_error, None);
}

#[then(expr = "the request is rejected as {word}")]
async fn request_rejected(world: &mut SettlementWorld, kind: String) {
    let last = world.system().last_error.expect("The last request succeeded");
    assert_eq!(format!("{last:?}"), kind);
}

#[then(expr = "the wallet of store '{word}' holds {int} kobo")]
async fn wallet_holds(world: &mut SettlementWorld, store_id: String, amount: i64) {
    let store = StoreId::from(store_id);
    let wallets = world.system().wallets();
    let balance = wallets.balance(&store).await.expect("Error fetching balance");
    assert_eq!(balance.balance, Kobo::from(amount));
    let reconciliation = wallets.reconcile(&store).await.expect("Error reconciling wallet");
    assert!(reconciliation.consistent, "Wallet of {store} does not match its ledger");
}

#[then(expr = "the escrow of order {word} is {word}")]
async fn escrow_state(world: &mut SettlementWorld, order_id: String, state: String) {
    let sub_order = world.system().sub_order(&order_id).await;
    let actual = sub_order.escrow.state().expect("Corrupt escrow record");
    assert_eq!(actual.to_string(), state);
}

#[then(expr = "the delivery status of order {word} is {string}")]
async fn delivery_status(world: &mut SettlementWorld, order_id: String, status: String) {
    let sub_order = world.system().sub_order(&order_id).await;
    assert_eq!(sub_order.delivery_status.to_string(), status);
}

#[then(expr = "the fund release of order {word} is {word}")]
async fn fund_release_status(world: &mut SettlementWorld, order_id: String, status: String) {
    let sub_order = world.system().sub_order(&order_id).await;
    let release = world
        .system()
        .db
        .fetch_fund_release_by_sub_order(sub_order.id)
        .await
        .expect("Error fetching fund release")
        .expect("No fund release");
    assert_eq!(release.status.to_string(), status);
}

#[then(expr = "order {word} is {word}")]
async fn payment_status(world: &mut SettlementWorld, order_id: String, status: String) {
    let order = world.system().db.fetch_order(&OrderId::from(order_id)).await.unwrap().expect("Order not found");
    assert_eq!(order.payment_status.to_string(), status);
}

#[then(expr = "the refund queue holds {int} sub-order(s)")]
async fn refund_queue(world: &mut SettlementWorld, count: usize) {
    let queue = world.system().escrow().refund_queue(Pagination::default()).await.expect("Error fetching queue");
    assert_eq!(queue.data.len(), count);
}
