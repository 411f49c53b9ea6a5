//! Access control list middleware for the settlement server.
//! This middleware can be placed on any route or service.
//!
//! It asks the [`AdminAuthority`] registered as app data who is making the request, and checks that they hold every
//! permission the route requires. Anonymous requests get a 401 and under-privileged ones a 403. Allowed requests
//! carry the [`AdminUser`] in their extensions, and successful changes are written to the audit log.
use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    http::Method,
    web,
    Error,
    HttpMessage,
};
use futures::future::{ok, Ready};
use log::*;

use crate::{
    auth::{AdminAuthority, AdminUser, Permission},
    config::ServerOptions,
    errors::ServerError,
    helpers::get_remote_ip,
    integrations::notifications::{AuditEntry, AuditLog},
};

pub struct AclMiddlewareFactory {
    required_permissions: Vec<Permission>,
}

impl AclMiddlewareFactory {
    pub fn new(required_permissions: &[Permission]) -> Self {
        AclMiddlewareFactory { required_permissions: required_permissions.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_permissions: self.required_permissions.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_permissions: Vec<Permission>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_permissions = self.required_permissions.clone();
        Box::pin(async move {
            let authority = req.app_data::<web::Data<dyn AdminAuthority>>().cloned().ok_or_else(|| {
                error!("🔐️ No admin authority has been registered with the server");
                ErrorInternalServerError("No admin authority configured")
            })?;
            let admin = authority.admin_from_request(req.request()).ok_or_else(|| {
                debug!("🔐️ Anonymous request to {} refused", req.path());
                ServerError::Unauthorized
            })?;
            if !authority.check_permission(&admin, &required_permissions) {
                let required = required_permissions.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
                warn!("🔐️ {} tried to access {} without the required permissions [{required}]", admin.id, req.path());
                return Err(ServerError::InsufficientPermissions(format!("Requires [{required}]")).into());
            }
            trace!("🔐️ {} granted access to {}", admin.id, req.path());
            let audit = if req.method() == Method::GET {
                None
            } else {
                req.app_data::<web::Data<dyn AuditLog>>().cloned().map(|log| {
                    let options = req.app_data::<web::Data<ServerOptions>>().map(|o| ***o).unwrap_or_default();
                    let remote_ip = get_remote_ip(req.request(), options);
                    let entry = AuditEntry::new(admin.id.clone(), format!("{} {}", req.method(), req.path()), req.path())
                        .with_remote_ip(remote_ip);
                    (log, entry)
                })
            };
            req.extensions_mut().insert::<AdminUser>(admin);
            let res = service.call(req).await?;
            if let Some((log, entry)) = audit {
                if res.status().is_success() {
                    log.log_action(entry);
                }
            }
            Ok(res)
        })
    }
}
