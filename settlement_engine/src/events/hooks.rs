use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EscrowRefundedEvent,
    EscrowReleasedEvent,
    EventHandler,
    EventProducer,
    FundReleaseFailedEvent,
    Handler,
    PaymentStatusChangedEvent,
    WithdrawalRequestedEvent,
};

pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The publishing side of every configured hook. Cheap to clone; each API holds its own copy.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_status_changed_producer: Vec<EventProducer<PaymentStatusChangedEvent>>,
    pub escrow_released_producer: Vec<EventProducer<EscrowReleasedEvent>>,
    pub escrow_refunded_producer: Vec<EventProducer<EscrowRefundedEvent>>,
    pub withdrawal_requested_producer: Vec<EventProducer<WithdrawalRequestedEvent>>,
    pub fund_release_failed_producer: Vec<EventProducer<FundReleaseFailedEvent>>,
}

async fn publish_all<E: Clone + Send + Sync>(producers: &[EventProducer<E>], event: E) {
    for producer in producers {
        producer.publish_event(event.clone()).await;
    }
}

impl EventProducers {
    pub async fn payment_status_changed(&self, event: PaymentStatusChangedEvent) {
        publish_all(&self.payment_status_changed_producer, event).await;
    }

    pub async fn escrow_released(&self, event: EscrowReleasedEvent) {
        publish_all(&self.escrow_released_producer, event).await;
    }

    pub async fn escrow_refunded(&self, event: EscrowRefundedEvent) {
        publish_all(&self.escrow_refunded_producer, event).await;
    }

    pub async fn withdrawal_requested(&self, event: WithdrawalRequestedEvent) {
        publish_all(&self.withdrawal_requested_producer, event).await;
    }

    pub async fn fund_release_failed(&self, event: FundReleaseFailedEvent) {
        publish_all(&self.fund_release_failed_producer, event).await;
    }
}

pub struct EventHandlers {
    pub on_payment_status_changed: Option<EventHandler<PaymentStatusChangedEvent>>,
    pub on_escrow_released: Option<EventHandler<EscrowReleasedEvent>>,
    pub on_escrow_refunded: Option<EventHandler<EscrowRefundedEvent>>,
    pub on_withdrawal_requested: Option<EventHandler<WithdrawalRequestedEvent>>,
    pub on_fund_release_failed: Option<EventHandler<FundReleaseFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_payment_status_changed: hooks.on_payment_status_changed.map(|f| EventHandler::new(buffer_size, f)),
            on_escrow_released: hooks.on_escrow_released.map(|f| EventHandler::new(buffer_size, f)),
            on_escrow_refunded: hooks.on_escrow_refunded.map(|f| EventHandler::new(buffer_size, f)),
            on_withdrawal_requested: hooks.on_withdrawal_requested.map(|f| EventHandler::new(buffer_size, f)),
            on_fund_release_failed: hooks.on_fund_release_failed.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_status_changed {
            result.payment_status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_escrow_released {
            result.escrow_released_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_escrow_refunded {
            result.escrow_refunded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_requested {
            result.withdrawal_requested_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_fund_release_failed {
            result.fund_release_failed_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns every configured handler. Each one shuts down by itself once all of its producers are dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_escrow_released {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_escrow_refunded {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_withdrawal_requested {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_fund_release_failed {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_status_changed: Option<Handler<PaymentStatusChangedEvent>>,
    pub on_escrow_released: Option<Handler<EscrowReleasedEvent>>,
    pub on_escrow_refunded: Option<Handler<EscrowRefundedEvent>>,
    pub on_withdrawal_requested: Option<Handler<WithdrawalRequestedEvent>>,
    pub on_fund_release_failed: Option<Handler<FundReleaseFailedEvent>>,
}

impl EventHooks {
    pub fn on_payment_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentStatusChangedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_escrow_released<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EscrowReleasedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_escrow_released = Some(Arc::new(f));
        self
    }

    pub fn on_escrow_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EscrowRefundedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_escrow_refunded = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_requested<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalRequestedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_withdrawal_requested = Some(Arc::new(f));
        self
    }

    pub fn on_fund_release_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FundReleaseFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_fund_release_failed = Some(Arc::new(f));
        self
    }
}
