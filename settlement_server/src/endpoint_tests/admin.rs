use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest, web, HttpRequest};
use serde_json::Value;
use settlement_engine::{
    db_types::DeliveryStatus,
    events::EventProducers,
    settlement_api::query_objects::{Paginated, Pagination},
    EscrowApi,
};

use super::{
    helpers::{admin, send_request, send_request_with_authority, sub_order, MemoryAuditLog},
    mocks::MockEscrowManager,
};
use crate::{
    auth::{AdminAuthority, AdminUser, Permission},
    routes::{health, RefundQueueRoute},
};

fn configure_refunds(escrow: MockEscrowManager) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = EscrowApi::new(escrow, EventProducers::default());
        cfg.service(RefundQueueRoute::<MockEscrowManager>::new()).app_data(web::Data::new(api));
    }
}

fn refund_queue_mock() -> MockEscrowManager {
    let mut escrow = MockEscrowManager::new();
    escrow.expect_fetch_refund_queue().returning(|pagination| {
        let queue = vec![sub_order(7, DeliveryStatus::Returned), sub_order(9, DeliveryStatus::Canceled)];
        Ok(Paginated::new(queue, pagination, 2))
    });
    escrow
}

/// Recognises everyone as a support agent who may only look at settlements.
struct SupportDesk;

impl AdminAuthority for SupportDesk {
    fn admin_from_request(&self, _req: &HttpRequest) -> Option<AdminUser> {
        Some(AdminUser { id: "support".into(), permissions: vec![Permission::ViewSettlements] })
    }
}

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/health");
    let (status, body) = send_request(req, Arc::default(), |cfg| {
        cfg.service(health);
    })
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn refund_queue_needs_an_admin() {
    let _ = env_logger::try_init().ok();
    // No expectations: the database must never be reached
    let escrow = MockEscrowManager::new();
    let req = TestRequest::get().uri("/admin/refunds");
    let (status, body) = send_request(req, Arc::default(), configure_refunds(escrow)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[actix_web::test]
async fn refund_queue_needs_the_right_permission() {
    let _ = env_logger::try_init().ok();
    let escrow = MockEscrowManager::new();
    let req = TestRequest::get().uri("/admin/refunds");
    let (status, body) =
        send_request_with_authority(req, Arc::new(SupportDesk), Arc::default(), configure_refunds(escrow)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("manage_refunds"), "{body}");
}

#[actix_web::test]
async fn fetch_refund_queue() {
    let _ = env_logger::try_init().ok();
    let req = admin(TestRequest::get().uri("/admin/refunds?page=1&page_size=10"));
    let audit = Arc::new(MemoryAuditLog::default());
    let (status, body) = send_request(req, Arc::clone(&audit), configure_refunds(refund_queue_mock())).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["id"], 7);
    assert_eq!(data[1]["delivery_status"], "Canceled");
    assert_eq!(body["pagination"]["total"], 2);
    // Reads are not audited
    assert!(audit.entries().is_empty());
}

#[actix_web::test]
async fn default_pagination() {
    let _ = env_logger::try_init().ok();
    let mut escrow = MockEscrowManager::new();
    escrow
        .expect_fetch_refund_queue()
        .withf(|pagination| *pagination == Pagination::default())
        .returning(|pagination| Ok(Paginated::new(vec![], pagination, 0)));
    let req = admin(TestRequest::get().uri("/admin/refunds"));
    let (status, body) = send_request(req, Arc::default(), configure_refunds(escrow)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());
}
