use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest, web};
use serde_json::{json, Value};
use settlement_common::Secret;
use settlement_engine::{
    events::EventProducers,
    test_utils::{
        fakes::{ScriptedGateway, StaticCatalog},
        prepare_env::fresh_database,
    },
    traits::GatewayTransaction,
    CheckoutApi,
    PaymentVerifierApi,
    SqliteDatabase,
};

use super::helpers::send_request;
use crate::{
    middleware::{WebhookHashMiddlewareFactory, DEFAULT_WEBHOOK_HASH_HEADER},
    routes::{CheckoutRoute, CheckoutValidateRoute, GatewayWebhookRoute, VerifyPaymentRoute},
};

const WEBHOOK_HASH: &str = "flw-webhook-hash";

fn catalog() -> StaticCatalog {
    StaticCatalog::default()
        .with_product("ankara-dress", "store-a", 1_250_000, 4)
        .with_product("leather-bag", "store-b", 3_000_000, 1)
        .with_shipping_method("store-a", "gig", 150_000)
        .with_shipping_method("store-b", "dhl", 400_000)
}

fn configure_checkout(
    db: SqliteDatabase,
    catalog: StaticCatalog,
    gateway: ScriptedGateway,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = CheckoutApi::new(db, catalog, gateway);
        cfg.service(CheckoutValidateRoute::<SqliteDatabase, StaticCatalog, ScriptedGateway>::new())
            .service(CheckoutRoute::<SqliteDatabase, StaticCatalog, ScriptedGateway>::new())
            .app_data(web::Data::new(api));
    }
}

fn configure_webhook(db: SqliteDatabase, gateway: ScriptedGateway) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = PaymentVerifierApi::new(db, gateway, EventProducers::default());
        let scope = web::scope("/gateway")
            .wrap(WebhookHashMiddlewareFactory::new(DEFAULT_WEBHOOK_HASH_HEADER, Secret::new(WEBHOOK_HASH.into())))
            .service(GatewayWebhookRoute::<SqliteDatabase, ScriptedGateway>::new());
        cfg.service(scope).app_data(web::Data::new(api));
    }
}

fn configure_verify(db: SqliteDatabase, gateway: ScriptedGateway) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = PaymentVerifierApi::new(db, gateway, EventProducers::default());
        cfg.service(VerifyPaymentRoute::<SqliteDatabase, ScriptedGateway>::new()).app_data(web::Data::new(api));
    }
}

fn checkout_body(items: Value) -> Value {
    json!({
        "buyer_id": "buyer-42",
        "items": items,
        "shipping_address": {
            "full_name": "Adaeze Obi",
            "address": "12 Admiralty Way",
            "city": "Lekki",
            "state": "Lagos",
            "country": "NG",
            "phone": "+2348030000000"
        },
        "shipping_selections": {"store-a": "gig", "store-b": "dhl"}
    })
}

#[actix_web::test]
async fn checkout_splits_the_order_by_store() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let gateway = ScriptedGateway::default();
    let body = checkout_body(json!([
        {"product_id": "ankara-dress", "store_id": "store-a", "quantity": 2, "unit_price": 1_250_000},
        {"product_id": "leather-bag", "store_id": "store-b", "quantity": 1, "unit_price": 3_000_000}
    ]));
    let req = TestRequest::post().uri("/checkout").set_json(body);
    let (status, body) = send_request(req, Arc::default(), configure_checkout(db, catalog(), gateway.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    let sub_orders = body["sub_orders"].as_array().unwrap();
    assert_eq!(sub_orders.len(), 2);
    assert!(sub_orders.iter().all(|s| s["escrow"]["held"] == true), "{sub_orders:?}");
    // 2 x 12,500 + 30,000 in goods, plus 1,500 and 4,000 in shipping
    assert_eq!(body["order"]["total_amount"], 5_500_000 + 550_000);
    assert_eq!(body["order"]["payment_status"], "pending");
    let link = body["redirect_link"].as_str().unwrap();
    assert!(link.starts_with("https://checkout.example.com/pay/"), "{link}");
    let intents = gateway.intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].buyer_id, "buyer-42");
}

#[actix_web::test]
async fn checkout_rejects_stale_carts() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let gateway = ScriptedGateway::default();
    let body = checkout_body(json!([
        {"product_id": "ankara-dress", "store_id": "store-a", "quantity": 1, "unit_price": 1_000_000},
        {"product_id": "leather-bag", "store_id": "store-b", "quantity": 3, "unit_price": 3_000_000}
    ]));
    let req = TestRequest::post().uri("/checkout").set_json(body);
    let (status, body) = send_request(req, Arc::default(), configure_checkout(db, catalog(), gateway.clone())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_str(&body).unwrap();
    let errors = body["error"]["validation_errors"].as_array().unwrap();
    let codes = errors.iter().map(|e| e["code"].as_str().unwrap()).collect::<Vec<_>>();
    assert!(codes.contains(&"price_changed"), "{codes:?}");
    assert!(codes.contains(&"insufficient_stock"), "{codes:?}");
    // Nothing was sent to the gateway
    assert!(gateway.intents().is_empty());
}

#[actix_web::test]
async fn validate_cart_reports_problems_without_failing() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let items = json!([
        {"product_id": "ankara-dress", "store_id": "store-a", "quantity": 0, "unit_price": 1_250_000},
        {"product_id": "vanished", "store_id": "store-a", "quantity": 1, "unit_price": 1_000}
    ]);
    let req = TestRequest::post().uri("/checkout/validate").set_json(items);
    let (status, body) =
        send_request(req, Arc::default(), configure_checkout(db, catalog(), ScriptedGateway::default())).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["validation_errors"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn webhook_without_a_hash_is_refused() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let gateway = ScriptedGateway::default();
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .set_json(json!({"event": "charge.completed", "data": {"id": 4975363}}));
    let (status, _) = send_request(req, Arc::default(), configure_webhook(db, gateway.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(gateway.verify_calls(), 0);
}

#[actix_web::test]
async fn webhook_for_an_unknown_transaction_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let gateway = ScriptedGateway::default();
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header((DEFAULT_WEBHOOK_HASH_HEADER, WEBHOOK_HASH))
        .set_json(json!({"event": "charge.completed", "data": {"id": 4975363}}));
    let (status, body) = send_request(req, Arc::default(), configure_webhook(db, gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(gateway.verify_calls(), 1);
}

#[actix_web::test]
async fn webhook_is_retried_while_the_gateway_is_down() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let gateway = ScriptedGateway::default();
    gateway.set_offline(true);
    let req = TestRequest::post()
        .uri("/gateway/webhook")
        .insert_header((DEFAULT_WEBHOOK_HASH_HEADER, WEBHOOK_HASH))
        .set_json(json!({"data": {"id": "4975363"}}));
    let (status, _) = send_request(req, Arc::default(), configure_webhook(db, gateway)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn verified_payments_report_ok() {
    let _ = env_logger::try_init().ok();
    let db = fresh_database().await;
    let gateway = ScriptedGateway::default();
    let mut body = checkout_body(json!([
        {"product_id": "ankara-dress", "store_id": "store-a", "quantity": 1, "unit_price": 1_250_000}
    ]));
    body["shipping_selections"] = json!({"store-a": "gig"});
    let request = serde_json::from_value(body).unwrap();
    let checkout = CheckoutApi::new(db.clone(), catalog(), gateway.clone());
    let result = checkout.submit_checkout(request, chrono::Utc::now()).await.unwrap();
    gateway.set_transaction(GatewayTransaction {
        transaction_id: "4975363".into(),
        status: "successful".into(),
        tx_ref: Some(result.order.tx_ref.clone()),
        amount: Some(result.order.total_amount),
        currency: Some("NGN".into()),
        order_id: Some(result.order.order_id.clone()),
    });

    let req = TestRequest::post().uri("/payments/verify").set_json(json!({"transaction_id": "4975363"}));
    let (status, body) = send_request(req, Arc::default(), configure_verify(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["ok"], true);
    // The gateway has the money. Finalizing the order is a separate step
    assert_eq!(body["status"], "successful");
    assert_eq!(body["order_id"], result.order.order_id.as_str());

    // Unknown transactions get the error shape
    let req = TestRequest::post().uri("/payments/verify").set_json(json!({"transaction_id": "missing"}));
    let (status, body) = send_request(req, Arc::default(), configure_verify(db, gateway)).await;
    assert!(status.is_client_error(), "{status}: {body}");
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["ok"], false);
}
