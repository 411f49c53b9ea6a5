//! Post-commit notifications.
//!
//! Every state change that moves money publishes an event once its transaction has committed. Subscribers (the
//! notification service, the audit log, a gateway refund worker) hook in through [`EventHooks`]. They run on their
//! own tasks, so a slow or failing subscriber can never affect the financial state that triggered it.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers, HookFuture};
