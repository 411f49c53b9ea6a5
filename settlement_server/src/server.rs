use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use settlement_engine::{
    events::EventProducers,
    CheckoutApi,
    EscrowApi,
    FundReleaseApi,
    PaymentVerifierApi,
    SqliteDatabase,
    WalletApi,
};

use crate::{
    auth::{AdminAuthority, ApiKeyAuthority},
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    integrations::{
        catalog::HttpCatalog,
        flutterwave::FlutterwaveGateway,
        notifications::{create_notification_event_handlers, AuditLog, LogAuditLog, LogNotifier},
    },
    middleware::{WebhookHashMiddlewareFactory, DEFAULT_WEBHOOK_HASH_HEADER},
    routes::{
        health,
        AdminConfirmDeliveryRoute,
        ApproveRefundRoute,
        ApproveReturnRoute,
        CheckoutRoute,
        CheckoutSuccessRoute,
        CheckoutValidateRoute,
        ConfirmDeliveryRoute,
        FundReleaseRoute,
        FundReleaseSummaryRoute,
        FundReleasesRoute,
        GatewayWebhookRoute,
        RefundQueueRoute,
        RequestWithdrawalRoute,
        RetryReleaseRoute,
        ReverseReleaseRoute,
        RunReleaseCycleRoute,
        UpdateDeliveryStatusRoute,
        VerifyPaymentRoute,
        WalletReconcileRoute,
        WalletRoute,
        WalletTransactionsRoute,
        WithdrawalsRoute,
    },
    settlement_worker::start_settlement_worker,
};

const MAX_DB_CONNECTIONS: u32 = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        info!("🗃️ Database migrations are up to date");
    }
    let gateway =
        FlutterwaveGateway::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let audit: Arc<dyn AuditLog> = Arc::new(LogAuditLog);
    let handlers = create_notification_event_handlers(LogNotifier, Arc::clone(&audit));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    info!("📬️ Notification handlers started");
    // Keep the handle around so that the worker is not detached silently. It never completes.
    let _worker = start_settlement_worker(
        db.clone(),
        gateway.clone(),
        producers.clone(),
        config.release_interval,
        config.release_policy,
    );
    let srv = create_server_instance(config, db, gateway, producers, audit)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: FlutterwaveGateway,
    producers: EventProducers,
    audit: Arc<dyn AuditLog>,
) -> Result<Server, ServerError> {
    let catalog = HttpCatalog::new(&config.catalog_base_url);
    let authority: Arc<dyn AdminAuthority> = Arc::new(ApiKeyAuthority::new(config.admin_api_key.clone()));
    let options = ServerOptions::from_config(&config);
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone(), catalog.clone(), gateway.clone())
            .with_policy(config.checkout_policy);
        let verifier_api = PaymentVerifierApi::new(db.clone(), gateway.clone(), producers.clone())
            .with_grace_period(config.checkout_policy.payment_grace);
        let escrow_api = EscrowApi::new(db.clone(), producers.clone());
        let release_api = FundReleaseApi::new(db.clone(), producers.clone()).with_policy(config.release_policy);
        let wallet_api = WalletApi::new(db.clone(), producers.clone()).with_policy(config.withdrawal_policy);
        let webhook_scope = web::scope("/gateway")
            .wrap(WebhookHashMiddlewareFactory::new(DEFAULT_WEBHOOK_HASH_HEADER, config.gateway.webhook_hash.clone()))
            .service(GatewayWebhookRoute::<SqliteDatabase, FlutterwaveGateway>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("settle::access_log"))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(verifier_api))
            .app_data(web::Data::new(escrow_api))
            .app_data(web::Data::new(release_api))
            .app_data(web::Data::new(wallet_api))
            .app_data(web::Data::from(Arc::clone(&authority)))
            .app_data(web::Data::from(Arc::clone(&audit)))
            .app_data(web::Data::new(options))
            .service(health)
            // Buyer-facing
            .service(CheckoutValidateRoute::<SqliteDatabase, HttpCatalog, FlutterwaveGateway>::new())
            .service(CheckoutRoute::<SqliteDatabase, HttpCatalog, FlutterwaveGateway>::new())
            .service(CheckoutSuccessRoute::<SqliteDatabase, FlutterwaveGateway>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, FlutterwaveGateway>::new())
            .service(ConfirmDeliveryRoute::<SqliteDatabase>::new())
            .service(webhook_scope)
            // Admin
            .service(UpdateDeliveryStatusRoute::<SqliteDatabase>::new())
            .service(AdminConfirmDeliveryRoute::<SqliteDatabase>::new())
            .service(ApproveReturnRoute::<SqliteDatabase>::new())
            .service(RefundQueueRoute::<SqliteDatabase>::new())
            .service(ApproveRefundRoute::<SqliteDatabase>::new())
            .service(FundReleasesRoute::<SqliteDatabase>::new())
            .service(FundReleaseSummaryRoute::<SqliteDatabase>::new())
            .service(FundReleaseRoute::<SqliteDatabase>::new())
            .service(RunReleaseCycleRoute::<SqliteDatabase>::new())
            .service(ReverseReleaseRoute::<SqliteDatabase>::new())
            .service(RetryReleaseRoute::<SqliteDatabase>::new())
            .service(WalletRoute::<SqliteDatabase>::new())
            .service(WalletTransactionsRoute::<SqliteDatabase>::new())
            .service(WalletReconcileRoute::<SqliteDatabase>::new())
            .service(WithdrawalsRoute::<SqliteDatabase>::new())
            .service(RequestWithdrawalRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
