use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest, web};
use serde_json::{json, Value};
use settlement_common::Kobo;
use settlement_engine::{
    db_types::{StoreId, TransactionSource, TransactionType, Wallet, WalletTransaction, Withdrawal, WithdrawalStatus},
    events::EventProducers,
    traits::SettlementDbError,
    WalletApi,
};

use super::{
    helpers::{admin, send_request, timestamp, MemoryAuditLog},
    mocks::MockWalletManager,
};
use crate::routes::{RequestWithdrawalRoute, WalletReconcileRoute, WalletRoute};

fn configure(wallets: MockWalletManager) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let api = WalletApi::new(wallets, EventProducers::default());
        cfg.service(WalletRoute::<MockWalletManager>::new())
            .service(WalletReconcileRoute::<MockWalletManager>::new())
            .service(RequestWithdrawalRoute::<MockWalletManager>::new())
            .app_data(web::Data::new(api));
    }
}

fn wallet(store: &str, balance: i64) -> Wallet {
    Wallet { store_id: StoreId::from(store), balance: Kobo::from(balance), created_at: timestamp(), updated_at: timestamp() }
}

#[actix_web::test]
async fn wallet_balance() {
    let _ = env_logger::try_init().ok();
    let mut wallets = MockWalletManager::new();
    wallets
        .expect_fetch_wallet()
        .withf(|store_id| store_id.as_str() == "store-a")
        .returning(|_| Ok(Some(wallet("store-a", 2_500_000))));
    let req = admin(TestRequest::get().uri("/stores/store-a/wallet"));
    let (status, body) = send_request(req, Arc::default(), configure(wallets)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, json!({"store_id": "store-a", "balance": 2_500_000}));
}

#[actix_web::test]
async fn stores_without_a_wallet_have_nothing() {
    let _ = env_logger::try_init().ok();
    let mut wallets = MockWalletManager::new();
    wallets.expect_fetch_wallet().returning(|_| Ok(None));
    let req = admin(TestRequest::get().uri("/stores/new-store/wallet"));
    let (status, body) = send_request(req, Arc::default(), configure(wallets)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["balance"], 0);
}

#[actix_web::test]
async fn reconcile_reports_drift() {
    let _ = env_logger::try_init().ok();
    let mut wallets = MockWalletManager::new();
    wallets.expect_fetch_wallet().returning(|_| Ok(Some(wallet("store-a", 1_000_000))));
    wallets.expect_ledger_sum().returning(|_| Ok(Kobo::from(900_000)));
    let req = admin(TestRequest::get().uri("/stores/store-a/wallet/reconcile"));
    let (status, body) = send_request(req, Arc::default(), configure(wallets)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["consistent"], false);
    assert_eq!(body["ledger_sum"], 900_000);
}

#[actix_web::test]
async fn withdrawal_below_minimum() {
    let _ = env_logger::try_init().ok();
    // The policy rejects the amount before the database is consulted
    let wallets = MockWalletManager::new();
    let req = admin(TestRequest::post().uri("/stores/store-a/withdrawals")).set_json(json!({"amount": 99_999}));
    let audit = Arc::new(MemoryAuditLog::default());
    let (status, body) = send_request(req, Arc::clone(&audit), configure(wallets)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], "validation");
    assert!(audit.entries().is_empty());
}

#[actix_web::test]
async fn withdrawal_exceeding_balance() {
    let _ = env_logger::try_init().ok();
    let mut wallets = MockWalletManager::new();
    wallets.expect_process_withdrawal().times(1).returning(|w, _| {
        Err(SettlementDbError::InsufficientFunds {
            store_id: w.store_id,
            available: Kobo::from(200_000),
            requested: w.amount,
        })
    });
    let req = admin(TestRequest::post().uri("/stores/store-a/withdrawals")).set_json(json!({"amount": "5000"}));
    let (status, body) = send_request(req, Arc::default(), configure(wallets)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.contains("Insufficient funds"), "{body}");
}

#[actix_web::test]
async fn withdrawal_is_recorded() {
    let _ = env_logger::try_init().ok();
    let mut wallets = MockWalletManager::new();
    wallets
        .expect_process_withdrawal()
        .withf(|w, _| w.amount == Kobo::from(500_000) && w.fee == Kobo::from(17_500))
        .times(1)
        .returning(|w, now| {
            let withdrawal = Withdrawal {
                id: 3,
                store_id: w.store_id.clone(),
                amount: w.amount,
                fee: w.fee,
                net_amount: w.net_amount(),
                status: WithdrawalStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            let debit = WalletTransaction {
                id: 12,
                store_id: w.store_id.clone(),
                tx_type: TransactionType::Debit,
                amount: w.amount,
                source: TransactionSource::Withdrawal,
                order_id: None,
                description: "Withdrawal #3".into(),
                created_at: now,
            };
            Ok((withdrawal, debit, wallet("store-a", 1_500_000)))
        });
    let req = admin(TestRequest::post().uri("/stores/store-a/withdrawals")).set_json(json!({"amount": 500_000}));
    let audit = Arc::new(MemoryAuditLog::default());
    let (status, body) = send_request(req, Arc::clone(&audit), configure(wallets)).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["withdrawal"]["net_amount"], 482_500);
    assert_eq!(body["debit"]["tx_type"], "debit");
    assert_eq!(body["new_balance"], 1_500_000);
    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor, "test-admin");
}
