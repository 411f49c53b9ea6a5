use std::collections::BTreeMap;

use chrono::Duration;
use settlement_common::Kobo;
use settlement_engine::{
    db_types::{DeliveryStatus, OrderId, PaymentStatus, StoreId},
    settlement_api::{
        checkout_objects::{CartItem, CartValidationError, CheckoutRequest},
        shipping::ShippingError,
    },
    traits::{GatewayTransaction, ProductSnapshot},
    CheckoutError,
    ErrorKind,
    OrderManagement,
    PaymentReference,
    PaymentVerificationError,
    VerificationStatus,
};

mod support;
use support::{address, day, Harness};

fn item(product_id: &str, store_id: &str, quantity: i64, unit_price: i64) -> CartItem {
    CartItem {
        product_id: product_id.into(),
        store_id: StoreId::from(store_id),
        quantity,
        unit_price: Kobo::from(unit_price),
        size: None,
    }
}

fn request(items: Vec<CartItem>, selections: &[(&str, &str)]) -> CheckoutRequest {
    CheckoutRequest {
        buyer_id: "buyer-1".into(),
        items,
        shipping_address: address(),
        shipping_selections: selections.iter().map(|(s, m)| (StoreId::from(*s), m.to_string())).collect::<BTreeMap<_, _>>(),
    }
}

/// A physical product at store-a with one shipping method, and a digital product at store-b.
fn stock_catalog(harness: &Harness) {
    let catalog = harness.catalog.clone().with_product("shoe", "store-a", 10_000, 5).with_shipping_method(
        "store-a",
        "standard",
        1_500,
    );
    catalog.upsert(ProductSnapshot {
        product_id: "ebook".into(),
        store_id: StoreId::from("store-b"),
        price: Kobo::from(4_000),
        stock: 100,
        available: true,
        is_physical: false,
    });
}

async fn place_order(harness: &Harness) -> OrderId {
    stock_catalog(harness);
    let req = request(vec![item("shoe", "store-a", 2, 10_000)], &[("store-a", "standard")]);
    let result = harness.checkout().submit_checkout(req, day(0)).await.unwrap();
    result.order.order_id
}

#[tokio::test]
async fn checkout_splits_the_order_by_store() {
    let harness = Harness::new().await;
    stock_catalog(&harness);
    let req = request(
        vec![item("shoe", "store-a", 2, 10_000), item("ebook", "store-b", 1, 4_000)],
        &[("store-a", "standard")],
    );
    let result = harness.checkout().submit_checkout(req, day(0)).await.unwrap();

    let order = &result.order;
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.total_amount, Kobo::from(25_500));
    assert_eq!(order.shipping_total, Kobo::from(1_500));
    assert_eq!(order.expires_at, day(0) + Duration::minutes(30));
    assert!(order.tx_ref.starts_with(&format!("settle-{}-", order.order_id.as_str())));
    assert_eq!(result.redirect_link, format!("https://checkout.example.com/pay/{}", order.tx_ref));

    assert_eq!(result.sub_orders.len(), 2);
    let a = &result.sub_orders[0];
    assert_eq!(a.store_id, StoreId::from("store-a"));
    assert_eq!(a.sub_total, Kobo::from(20_000));
    assert_eq!(a.shipping_cost, Kobo::from(1_500));
    assert_eq!(a.platform_fee, Kobo::from(1_000));
    assert_eq!(a.settlement_amount, Kobo::from(20_500));
    let b = &result.sub_orders[1];
    assert_eq!(b.store_id, StoreId::from("store-b"));
    assert!(b.shipping_method.is_none());
    assert_eq!(b.settlement_amount, Kobo::from(3_800));
    for sub_order in &result.sub_orders {
        assert_eq!(sub_order.delivery_status, DeliveryStatus::Pending);
        assert!(sub_order.escrow.held);
    }

    let intents = harness.gateway.intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].amount, Kobo::from(25_500));
    assert_eq!(intents[0].currency, "NGN");
}

#[tokio::test]
async fn checkout_requires_a_shipping_choice_for_physical_items() {
    let harness = Harness::new().await;
    stock_catalog(&harness);
    let req = request(vec![item("shoe", "store-a", 1, 10_000)], &[]);
    let err = harness.checkout().submit_checkout(req, day(0)).await.unwrap_err();
    match err {
        CheckoutError::Shipping(ShippingError::MissingShippingSelection(stores)) => {
            assert_eq!(stores, vec![StoreId::from("store-a")])
        },
        e => panic!("Unexpected error: {e}"),
    }
    assert!(harness.gateway.intents().is_empty());
}

#[tokio::test]
async fn checkout_rejects_a_stale_price() {
    let harness = Harness::new().await;
    stock_catalog(&harness);
    harness.catalog.update("shoe", |p| p.price = Kobo::from(12_000));
    let req = request(vec![item("shoe", "store-a", 1, 10_000)], &[("store-a", "standard")]);
    let err = harness.checkout().submit_checkout(req, day(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    match err {
        CheckoutError::InvalidCart(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], CartValidationError::PriceChanged { .. }));
        },
        e => panic!("Unexpected error: {e}"),
    }
    assert!(harness.gateway.intents().is_empty());
}

#[tokio::test]
async fn stock_is_checked_across_cart_lines() {
    let harness = Harness::new().await;
    stock_catalog(&harness);
    let items = vec![item("shoe", "store-a", 3, 10_000), item("shoe", "store-a", 3, 10_000)];
    let validation = harness.checkout().validate_cart(&items).await.unwrap();
    assert!(!validation.is_valid);
    assert!(matches!(
        validation.validation_errors[0],
        CartValidationError::InsufficientStock { available: 5, requested: 6, .. }
    ));
}

#[tokio::test]
async fn huge_quantities_across_cart_lines_do_not_overflow() {
    let harness = Harness::new().await;
    stock_catalog(&harness);
    let items = vec![item("shoe", "store-a", i64::MAX, 10_000), item("shoe", "store-a", i64::MAX, 10_000)];
    let validation = harness.checkout().validate_cart(&items).await.unwrap();
    assert!(!validation.is_valid);
    assert!(validation
        .validation_errors
        .iter()
        .any(|e| matches!(e, CartValidationError::InvalidQuantity { quantity: i64::MAX, .. })));

    let req = request(items, &[("store-a", "standard")]);
    let err = harness.checkout().submit_checkout(req, day(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(harness.gateway.intents().is_empty());
}

#[tokio::test]
async fn a_payment_is_finalized_exactly_once() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    harness.successful_transaction("tx-1", order_id.as_str()).await;
    let verifier = harness.verifier();

    let first = verifier.finalize("tx-1", day(0)).await.unwrap();
    assert_eq!(first.status, VerificationStatus::Paid);
    assert!(first.changed);
    let second = verifier.finalize("tx-1", day(0)).await.unwrap();
    assert_eq!(second.status, VerificationStatus::Paid);
    assert!(!second.changed);
    assert_eq!(harness.gateway.verify_calls(), 2);

    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn an_underpayment_is_not_finalized() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    let mut tx = harness.successful_transaction("tx-1", order_id.as_str()).await;
    tx.amount = Some(Kobo::from(100));
    harness.gateway.set_transaction(tx);

    let err = harness.verifier().finalize("tx-1", day(0)).await.unwrap_err();
    assert!(matches!(err, PaymentVerificationError::AmountMismatch { .. }));
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn a_failed_payment_is_recorded_once() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    let mut tx = harness.successful_transaction("tx-1", order_id.as_str()).await;
    tx.status = "failed".into();
    harness.gateway.set_transaction(tx);
    let verifier = harness.verifier();
    let reference = PaymentReference::TransactionId("tx-1".into());

    let first = verifier.verify(&reference, day(0) + Duration::minutes(10)).await.unwrap();
    assert_eq!(first.status, VerificationStatus::Failed);
    assert!(first.changed);
    let second = verifier.verify(&reference, day(0) + Duration::minutes(20)).await.unwrap();
    assert_eq!(second.status, VerificationStatus::Failed);
    assert!(!second.changed);

    // The expiry moves out by the grace period from the first annulment only
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.expires_at, day(0) + Duration::minutes(40));
}

#[tokio::test]
async fn a_pending_payment_changes_nothing() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    let mut tx = harness.successful_transaction("tx-1", order_id.as_str()).await;
    tx.status = "pending".into();
    harness.gateway.set_transaction(tx);

    let outcome = harness.verifier().verify(&PaymentReference::TransactionId("tx-1".into()), day(0)).await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Pending);
    assert!(!outcome.changed);
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn a_paid_order_is_never_failed() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    let tx = harness.successful_transaction("tx-1", order_id.as_str()).await;
    let verifier = harness.verifier();
    verifier.finalize("tx-1", day(0)).await.unwrap();

    let late_failure = GatewayTransaction { transaction_id: "tx-2".into(), status: "failed".into(), ..tx };
    harness.gateway.set_transaction(late_failure);
    let outcome = verifier.verify(&PaymentReference::TransactionId("tx-2".into()), day(0)).await.unwrap();
    assert_eq!(outcome.status, VerificationStatus::Paid);
    assert!(!outcome.changed);
}

#[tokio::test]
async fn a_cancelled_order_is_never_revived() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    let verifier = harness.verifier();

    let abandoned = verifier.checkout_success(&order.tx_ref, None, day(0)).await.unwrap();
    assert_eq!(abandoned.status, VerificationStatus::Cancelled);
    assert!(abandoned.changed);

    harness.successful_transaction("tx-1", order_id.as_str()).await;
    let err = verifier.finalize("tx-1", day(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn a_redirect_for_another_order_is_rejected() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    harness.successful_transaction("tx-1", order_id.as_str()).await;

    let err = harness.verifier().checkout_success("settle-someone-else", Some("tx-1"), day(0)).await.unwrap_err();
    assert!(matches!(err, PaymentVerificationError::TxRefMismatch { .. }));
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn an_unreachable_gateway_changes_nothing() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    harness.successful_transaction("tx-1", order_id.as_str()).await;
    harness.gateway.set_offline(true);

    let err = harness.verifier().finalize("tx-1", day(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    let order = harness.db.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn abandoned_orders_expire() {
    let harness = Harness::new().await;
    let order_id = place_order(&harness).await;
    let verifier = harness.verifier();

    let expired = verifier.expire_abandoned_orders(day(0) + Duration::minutes(10)).await.unwrap();
    assert!(expired.is_empty());
    let expired = verifier.expire_abandoned_orders(day(0) + Duration::hours(1)).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, order_id);
    assert_eq!(expired[0].payment_status, PaymentStatus::Cancelled);
    let expired = verifier.expire_abandoned_orders(day(0) + Duration::hours(2)).await.unwrap();
    assert!(expired.is_empty());
}
