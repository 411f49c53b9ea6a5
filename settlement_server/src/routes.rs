//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every engine call is async, so keep it that way: no blocking I/O
//! and no `std::thread::sleep` in a handler.
//!
//! Routes that move money or expose store finances are wrapped in the ACL middleware (see [`crate::middleware`]).
//! Buyer-facing routes carry no admin auth; the buyer's identity is established upstream.
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use settlement_engine::{
    db_types::StoreId,
    settlement_api::{
        checkout_objects::{CartItem, CheckoutRequest},
        query_objects::{FundReleaseQuery, Pagination, WithdrawalQuery},
    },
    traits::{Catalog, EscrowManagement, FundReleaseManagement, OrderManagement, PaymentGateway, WalletManagement},
    CheckoutApi,
    ErrorKind,
    EscrowApi,
    FundReleaseApi,
    PaymentVerifierApi,
    WalletApi,
};

use crate::{
    auth::{AdminUser, Permission},
    data_objects::{
        CheckoutSuccessParams,
        ConfirmDeliveryRequest,
        DeliveryStatusUpdate,
        JsonResponse,
        NoteRequest,
        ReasonRequest,
        ReversalResult,
        VerifyPaymentRequest,
        WebhookPayload,
        WithdrawalRequest,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires [$($perms:expr),*]) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($perms),+]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($perms:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($perms),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout_validate => Post "/checkout/validate" impl OrderManagement, Catalog, PaymentGateway);
/// Checks a cart against the live catalog without creating anything. Always 200; the verdict is in the body.
pub async fn checkout_validate<B, C, G>(
    body: web::Json<Vec<CartItem>>,
    api: web::Data<CheckoutApi<B, C, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    C: Catalog,
    G: PaymentGateway,
{
    trace!("💻️ Received cart validation request for {} items", body.len());
    let validation = api.validate_cart(&body).await?;
    Ok(HttpResponse::Ok().json(validation))
}

route!(checkout => Post "/checkout" impl OrderManagement, Catalog, PaymentGateway);
/// Submits a checkout. The cart is re-validated, the order saved with one held sub-order per store, and the buyer is
/// handed the gateway's payment link.
pub async fn checkout<B, C, G>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutApi<B, C, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    C: Catalog,
    G: PaymentGateway,
{
    let request = body.into_inner();
    debug!("💻️ Received checkout request from {} with {} items", request.buyer_id, request.items.len());
    let result = api.submit_checkout(request, Utc::now()).await?;
    Ok(HttpResponse::Created().json(result))
}

route!(checkout_success => Get "/checkout/success" impl OrderManagement, PaymentGateway);
/// The gateway redirects the buyer here after payment. Whatever status the redirect claims, the gateway is asked
/// directly.
pub async fn checkout_success<B, G>(
    params: web::Query<CheckoutSuccessParams>,
    api: web::Data<PaymentVerifierApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    G: PaymentGateway,
{
    let CheckoutSuccessParams { tx_ref, transaction_id } = params.into_inner();
    debug!("💻️ Buyer returned from the gateway. tx_ref: {tx_ref}, transaction: {transaction_id:?}");
    let outcome = api.checkout_success(&tx_ref, transaction_id.as_deref(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(verify_payment => Post "/payments/verify" impl OrderManagement, PaymentGateway);
pub async fn verify_payment<B, G>(
    body: web::Json<VerifyPaymentRequest>,
    api: web::Data<PaymentVerifierApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    G: PaymentGateway,
{
    let reference = body.into_inner().reference()?;
    debug!("💻️ Verification requested for {reference}");
    let outcome = api.verify(&reference, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(gateway_webhook => Post "/webhook" impl OrderManagement, PaymentGateway);
/// Gateway webhook. Mounted under `/gateway`, behind the webhook hash middleware.
///
/// Only the transaction id is taken from the payload; the payment is re-verified with the gateway and finalized from
/// that. Anything but a transient failure is acknowledged with a 200 so that the gateway stops redelivering a
/// webhook we will never be able to act on. Transient failures return 503 and the gateway will try again.
pub async fn gateway_webhook<B, G>(
    body: web::Json<WebhookPayload>,
    api: web::Data<PaymentVerifierApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    G: PaymentGateway,
{
    let payload = body.into_inner();
    let transaction_id = payload.data.id;
    debug!("💻️ Webhook {} received for transaction {transaction_id}", payload.event.as_deref().unwrap_or("(none)"));
    match api.finalize(&transaction_id, Utc::now()).await {
        Ok(outcome) => {
            info!("💻️ Webhook for transaction {transaction_id} processed. Payment is {}", outcome.status);
            Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Payment is {}", outcome.status))))
        },
        Err(e) if e.kind() == ErrorKind::Transient => {
            warn!("💻️ Webhook for transaction {transaction_id} could not be processed now. {e}");
            Err(e.into())
        },
        Err(e) => {
            warn!("💻️ Webhook for transaction {transaction_id} was not acted on. {e}");
            Ok(HttpResponse::Ok().json(JsonResponse::failure(e.to_string())))
        },
    }
}

//----------------------------------------------   Delivery  ----------------------------------------------------
route!(update_delivery_status => Post "/sub_orders/{id}/delivery_status" impl EscrowManagement where requires [Permission::ManageDeliveries]);
pub async fn update_delivery_status<B: EscrowManagement>(
    path: web::Path<i64>,
    body: web::Json<DeliveryStatusUpdate>,
    api: web::Data<EscrowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    let update = body.into_inner();
    debug!("💻️ Delivery status update for sub-order #{sub_order_id}: {}", update.status);
    let changed = api.update_delivery_status(sub_order_id, update.into(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(changed))
}

route!(confirm_delivery => Post "/sub_orders/{id}/confirm" impl EscrowManagement);
pub async fn confirm_delivery<B: EscrowManagement>(
    path: web::Path<i64>,
    body: web::Json<ConfirmDeliveryRequest>,
    api: web::Data<EscrowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    debug!("💻️ {} is confirming delivery of sub-order #{sub_order_id}", body.buyer_id);
    let sub_order = api.confirm_delivery(sub_order_id, &body.buyer_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(sub_order))
}

route!(admin_confirm_delivery => Post "/admin/sub_orders/{id}/confirm" impl EscrowManagement where requires [Permission::ConfirmDelivery]);
pub async fn admin_confirm_delivery<B: EscrowManagement>(
    admin: AdminUser,
    path: web::Path<i64>,
    api: web::Data<EscrowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    info!("💻️ {} is confirming delivery of sub-order #{sub_order_id} on the buyer's behalf", admin.id);
    let sub_order = api.admin_confirm_delivery(sub_order_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(sub_order))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
route!(approve_return => Post "/admin/sub_orders/{id}/approve_return" impl EscrowManagement where requires [Permission::ManageRefunds]);
pub async fn approve_return<B: EscrowManagement>(
    admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<ReasonRequest>,
    api: web::Data<EscrowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    info!("💻️ {} approved the return of sub-order #{sub_order_id}", admin.id);
    let reason = non_empty_or(&body.reason, "Return approved");
    let outcome = api.approve_return(sub_order_id, &reason, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(refund_queue => Get "/admin/refunds" impl EscrowManagement where requires [Permission::ManageRefunds]);
pub async fn refund_queue<B: EscrowManagement>(
    query: web::Query<Pagination>,
    api: web::Data<EscrowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Fetching refund queue. Page {}", query.page);
    let queue = api.refund_queue(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(queue))
}

route!(approve_refund => Post "/admin/refunds/{id}/approve" impl EscrowManagement where requires [Permission::ManageRefunds]);
pub async fn approve_refund<B: EscrowManagement>(
    admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<ReasonRequest>,
    api: web::Data<EscrowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    info!("💻️ {} approved the refund of sub-order #{sub_order_id}", admin.id);
    let reason = non_empty_or(&body.reason, "Refund approved");
    let outcome = api.approve_queued_refund(sub_order_id, &reason, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

//----------------------------------------------   Fund releases  ----------------------------------------------------
route!(fund_releases => Get "/stores/{store_id}/fund_releases" impl FundReleaseManagement where requires [Permission::ViewSettlements]);
pub async fn fund_releases<B: FundReleaseManagement>(
    path: web::Path<String>,
    query: web::Query<FundReleaseQuery>,
    api: web::Data<FundReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    trace!("💻️ Fetching fund releases for {store_id}. {}", *query);
    let releases = api.list_fund_releases(&store_id, &query).await?;
    Ok(HttpResponse::Ok().json(releases))
}

route!(fund_release_summary => Get "/stores/{store_id}/fund_releases/summary" impl FundReleaseManagement where requires [Permission::ViewSettlements]);
pub async fn fund_release_summary<B: FundReleaseManagement>(
    path: web::Path<String>,
    api: web::Data<FundReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    trace!("💻️ Fetching fund release summary for {store_id}");
    let summary = api.fund_release_summary(&store_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(fund_release => Get "/stores/{store_id}/fund_releases/{id}" impl FundReleaseManagement where requires [Permission::ViewSettlements]);
pub async fn fund_release<B: FundReleaseManagement>(
    path: web::Path<(String, i64)>,
    api: web::Data<FundReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (store_id, release_id) = path.into_inner();
    let store_id = StoreId::from(store_id);
    trace!("💻️ Fetching fund release #{release_id} for {store_id}");
    let detail = api.fetch_fund_release(&store_id, release_id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

route!(run_release_cycle => Post "/admin/fund_releases/run" impl FundReleaseManagement where requires [Permission::ManageSettlements]);
pub async fn run_release_cycle<B: FundReleaseManagement>(
    admin: AdminUser,
    api: web::Data<FundReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ {} triggered a fund release run", admin.id);
    let result = api.run_release_cycle(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(reverse_release => Post "/admin/fund_releases/{id}/reverse" impl FundReleaseManagement where requires [Permission::ManageSettlements]);
pub async fn reverse_release<B: FundReleaseManagement>(
    admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<NoteRequest>,
    api: web::Data<FundReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let release_id = path.into_inner();
    if body.note.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("A note explaining the reversal is required".into()));
    }
    warn!("💻️ {} is reversing fund release #{release_id}: {}", admin.id, body.note);
    let note = format!("Reversed by {}: {}", admin.id, body.note.trim());
    let (release, debit) = api.reverse_release(release_id, &note, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(ReversalResult { release, debit }))
}

route!(retry_release => Post "/admin/fund_releases/{id}/retry" impl FundReleaseManagement where requires [Permission::ManageSettlements]);
pub async fn retry_release<B: FundReleaseManagement>(
    admin: AdminUser,
    path: web::Path<i64>,
    api: web::Data<FundReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let release_id = path.into_inner();
    info!("💻️ {} queued fund release #{release_id} for retry", admin.id);
    let release = api.retry_release(release_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(release))
}

//----------------------------------------------   Wallets  ----------------------------------------------------
route!(wallet => Get "/stores/{store_id}/wallet" impl WalletManagement where requires [Permission::ViewSettlements]);
pub async fn wallet<B: WalletManagement>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    trace!("💻️ Fetching wallet balance for {store_id}");
    let balance = api.balance(&store_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

route!(wallet_transactions => Get "/stores/{store_id}/wallet/transactions" impl WalletManagement where requires [Permission::ViewSettlements]);
pub async fn wallet_transactions<B: WalletManagement>(
    path: web::Path<String>,
    query: web::Query<Pagination>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    trace!("💻️ Fetching wallet history for {store_id}. Page {}", query.page);
    let history = api.history(&store_id, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(wallet_reconcile => Get "/stores/{store_id}/wallet/reconcile" impl WalletManagement where requires [Permission::ViewSettlements]);
pub async fn wallet_reconcile<B: WalletManagement>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    let reconciliation = api.reconcile(&store_id).await?;
    if !reconciliation.consistent {
        error!(
            "💻️ Wallet for {store_id} does not match its ledger. Cached: {}, ledger: {}",
            reconciliation.cached, reconciliation.ledger_sum
        );
    }
    Ok(HttpResponse::Ok().json(reconciliation))
}

route!(withdrawals => Get "/stores/{store_id}/withdrawals" impl WalletManagement where requires [Permission::ViewSettlements]);
pub async fn withdrawals<B: WalletManagement>(
    path: web::Path<String>,
    query: web::Query<WithdrawalQuery>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    trace!("💻️ Fetching withdrawals for {store_id}");
    let withdrawals = api.list_withdrawals(&store_id, &query).await?;
    Ok(HttpResponse::Ok().json(withdrawals))
}

route!(request_withdrawal => Post "/stores/{store_id}/withdrawals" impl WalletManagement where requires [Permission::ManageWithdrawals]);
pub async fn request_withdrawal<B: WalletManagement>(
    admin: AdminUser,
    path: web::Path<String>,
    body: web::Json<WithdrawalRequest>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = StoreId::from(path.into_inner());
    info!("💻️ {} requested a withdrawal of {} for {store_id}", admin.id, body.amount);
    let receipt = api.request_withdrawal(&store_id, body.amount, Utc::now()).await?;
    Ok(HttpResponse::Created().json(receipt))
}

fn non_empty_or(s: &str, default: &str) -> String {
    let s = s.trim();
    if s.is_empty() {
        default.to_string()
    } else {
        s.to_string()
    }
}
