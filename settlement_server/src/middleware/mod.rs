mod acl;
mod webhook;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use webhook::{WebhookHashMiddlewareFactory, WebhookHashMiddlewareService, DEFAULT_WEBHOOK_HASH_HEADER};
