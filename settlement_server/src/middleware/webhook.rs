//! Webhook signature middleware.
//!
//! The gateway signs its webhooks by sending a shared secret hash in a header (`verif-hash` for Flutterwave). Any
//! request whose header does not match the configured hash is refused with a 401 before it reaches a handler. If no
//! hash has been configured, every webhook is refused.
//!
//! The body is not inspected, so unlike an HMAC check there is no need to buffer and replay the payload.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use settlement_common::Secret;

use crate::errors::ServerError;

pub const DEFAULT_WEBHOOK_HASH_HEADER: &str = "verif-hash";

pub struct WebhookHashMiddlewareFactory {
    hash_header: String,
    hash: Secret<String>,
}

impl WebhookHashMiddlewareFactory {
    pub fn new(hash_header: &str, hash: Secret<String>) -> Self {
        if hash.is_empty() {
            warn!("🔐️ No webhook hash has been configured. All gateway webhooks will be refused.");
        }
        WebhookHashMiddlewareFactory { hash_header: hash_header.into(), hash }
    }
}

impl<S, B> Transform<S, ServiceRequest> for WebhookHashMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = WebhookHashMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WebhookHashMiddlewareService {
            hash_header: self.hash_header.clone(),
            hash: self.hash.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct WebhookHashMiddlewareService<S> {
    hash_header: String,
    hash: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for WebhookHashMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let validated = req
            .headers()
            .get(&self.hash_header)
            .and_then(|v| v.to_str().ok())
            .map(|v| self.hash.matches(v))
            .unwrap_or(false);
        Box::pin(async move {
            if validated {
                trace!("🔐️ Webhook hash check for request ✅️");
                service.call(req).await
            } else {
                warn!("🔐️ Webhook with a missing or invalid hash received. Denying access.");
                Err(ServerError::InvalidWebhookSignature.into())
            }
        })
    }
}
