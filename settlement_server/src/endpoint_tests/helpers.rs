use std::sync::{Arc, Mutex};

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use settlement_common::{Kobo, Secret};
use settlement_engine::db_types::{
    CustomerConfirmation,
    DeliveryStatus,
    EscrowRecord,
    Json,
    OrderId,
    StoreId,
    SubOrder,
};

use crate::{
    auth::{AdminAuthority, ApiKeyAuthority, ADMIN_KEY_HEADER},
    config::ServerOptions,
    integrations::notifications::{AuditEntry, AuditLog},
};

// DO NOT re-use this key anywhere.
pub const TEST_ADMIN_KEY: &str = "0b5c9e0d-test-admin-key";

#[derive(Default)]
pub struct MemoryAuditLog(pub Mutex<Vec<AuditEntry>>);

impl AuditLog for MemoryAuditLog {
    fn log_action(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(entry);
        }
    }
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

pub fn admin(req: TestRequest) -> TestRequest {
    req.insert_header((ADMIN_KEY_HEADER, TEST_ADMIN_KEY)).insert_header(("X-Admin-Id", "test-admin"))
}

/// Sends `req` to an app set up by `configure`, with the API key authority and `audit` registered.
pub async fn send_request<F>(req: TestRequest, audit: Arc<MemoryAuditLog>, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let authority: Arc<dyn AdminAuthority> = Arc::new(ApiKeyAuthority::new(Secret::new(TEST_ADMIN_KEY.into())));
    send_request_with_authority(req, authority, audit, configure).await
}

pub async fn send_request_with_authority<F>(
    req: TestRequest,
    authority: Arc<dyn AdminAuthority>,
    audit: Arc<MemoryAuditLog>,
    configure: F,
) -> (StatusCode, String)
where
    F: FnOnce(&mut ServiceConfig),
{
    let audit: Arc<dyn AuditLog> = audit;
    let app = App::new()
        .app_data(web::Data::from(authority))
        .app_data(web::Data::from(audit))
        .app_data(web::Data::new(ServerOptions::default()))
        .configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => res.into_parts().1,
        // Middleware errors arrive here rather than as a response
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn sub_order(id: i64, status: DeliveryStatus) -> SubOrder {
    SubOrder {
        id,
        order_id: OrderId::from("ord-100"),
        store_id: StoreId::from("store-a"),
        line_items: Json(vec![]),
        sub_total: Kobo::from(1_000_000),
        shipping_cost: Kobo::from(150_000),
        platform_fee: Kobo::from(50_000),
        settlement_amount: Kobo::from(1_100_000),
        delivery_status: status,
        shipping_method: None,
        delivery_date: None,
        customer_confirmation: CustomerConfirmation::default(),
        return_window: None,
        escrow: EscrowRecord::default(),
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}
