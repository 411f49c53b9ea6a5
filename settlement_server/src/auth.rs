//! Administrator authorization.
//!
//! The server does not manage administrator accounts itself. It asks an [`AdminAuthority`] who is making a request
//! and whether they hold the permissions a route requires. [`ApiKeyAuthority`] is the built-in authority: a request
//! carrying the configured key in the `X-Admin-Key` header acts as an administrator with every permission.
use std::{
    fmt::Display,
    future::{ready, Ready},
};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_common::Secret;

use crate::errors::ServerError;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";
/// Optional. Names the administrator acting with the shared key, for the audit log.
pub const ADMIN_ID_HEADER: &str = "X-Admin-Id";
const DEFAULT_ADMIN_ID: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageDeliveries,
    ConfirmDelivery,
    ManageRefunds,
    ViewSettlements,
    ManageSettlements,
    ManageWithdrawals,
}

impl Permission {
    pub fn all() -> Vec<Permission> {
        vec![
            Permission::ManageDeliveries,
            Permission::ConfirmDelivery,
            Permission::ManageRefunds,
            Permission::ViewSettlements,
            Permission::ManageSettlements,
            Permission::ManageWithdrawals,
        ]
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Permission::ManageDeliveries => "manage_deliveries",
            Permission::ConfirmDelivery => "confirm_delivery",
            Permission::ManageRefunds => "manage_refunds",
            Permission::ViewSettlements => "view_settlements",
            Permission::ManageSettlements => "manage_settlements",
            Permission::ManageWithdrawals => "manage_withdrawals",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub permissions: Vec<Permission>,
}

pub trait AdminAuthority: Send + Sync {
    /// Identifies the administrator behind a request, if there is one.
    fn admin_from_request(&self, req: &HttpRequest) -> Option<AdminUser>;

    /// True if `admin` holds every one of `permissions`.
    fn check_permission(&self, admin: &AdminUser, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| admin.permissions.contains(p))
    }
}

/// Grants every permission to requests that present the configured API key.
#[derive(Debug, Clone)]
pub struct ApiKeyAuthority {
    api_key: Secret<String>,
}

impl ApiKeyAuthority {
    pub fn new(api_key: Secret<String>) -> Self {
        if api_key.is_empty() {
            warn!("🔐️ No admin API key has been configured. Every admin request will be refused.");
        }
        Self { api_key }
    }
}

impl AdminAuthority for ApiKeyAuthority {
    fn admin_from_request(&self, req: &HttpRequest) -> Option<AdminUser> {
        let key = req.headers().get(ADMIN_KEY_HEADER)?.to_str().ok()?;
        if !self.api_key.matches(key) {
            debug!("🔐️ Invalid admin key presented");
            return None;
        }
        let id = req
            .headers()
            .get(ADMIN_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ADMIN_ID)
            .to_string();
        Some(AdminUser { id, permissions: Permission::all() })
    }
}

/// Handlers behind the ACL middleware can take the authenticated [`AdminUser`] as an argument.
impl FromRequest for AdminUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<AdminUser>().cloned().ok_or(ServerError::Unauthorized))
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    fn authority() -> ApiKeyAuthority {
        ApiKeyAuthority::new(Secret::new("s3cret-admin-key".into()))
    }

    #[test]
    fn api_key_grants_everything() {
        let req = TestRequest::default()
            .insert_header((ADMIN_KEY_HEADER, "s3cret-admin-key"))
            .insert_header((ADMIN_ID_HEADER, "ngozi"))
            .to_http_request();
        let admin = authority().admin_from_request(&req).expect("Admin should be recognised");
        assert_eq!(admin.id, "ngozi");
        assert!(authority().check_permission(&admin, &[Permission::ManageRefunds, Permission::ViewSettlements]));
    }

    #[test]
    fn wrong_or_missing_key() {
        let req = TestRequest::default().insert_header((ADMIN_KEY_HEADER, "guess")).to_http_request();
        assert!(authority().admin_from_request(&req).is_none());
        let req = TestRequest::default().to_http_request();
        assert!(authority().admin_from_request(&req).is_none());
        // An unconfigured key never matches, not even an empty header
        let open = ApiKeyAuthority::new(Secret::default());
        let req = TestRequest::default().insert_header((ADMIN_KEY_HEADER, "")).to_http_request();
        assert!(open.admin_from_request(&req).is_none());
    }

    #[test]
    fn permission_checks() {
        let admin = AdminUser { id: "support".into(), permissions: vec![Permission::ViewSettlements] };
        let authority = authority();
        assert!(authority.check_permission(&admin, &[Permission::ViewSettlements]));
        assert!(!authority.check_permission(&admin, &[Permission::ViewSettlements, Permission::ManageSettlements]));
        assert_eq!(Permission::ManageWithdrawals.to_string(), "manage_withdrawals");
    }
}
