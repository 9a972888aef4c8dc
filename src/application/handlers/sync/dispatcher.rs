//! BillingEventDispatcher - Routes Stripe event types to their handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    CheckoutEventHandler, CustomerEventHandler, IdentityResolver, InvoiceEventHandler,
    PaymentMethodEventHandler, SubscriptionEventHandler,
};
use crate::domain::billing::{PlanCatalog, StripeEventType, WebhookDispatcher, WebhookEventHandler};
use crate::ports::{BillingStore, StripeGateway};

/// Registry of one handler per event type.
#[derive(Default)]
pub struct BillingEventDispatcher {
    handlers: HashMap<StripeEventType, Arc<dyn WebhookEventHandler>>,
}

impl BillingEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for every type it declares. A later registration
    /// for the same type replaces the earlier one.
    pub fn register(mut self, handler: Arc<dyn WebhookEventHandler>) -> Self {
        for event_type in handler.handles() {
            self.handlers.insert(event_type, handler.clone());
        }
        self
    }

    /// All sync handlers wired to the given stores.
    pub fn with_sync_handlers(
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn StripeGateway>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        let resolver = Arc::new(IdentityResolver::new(store.clone(), gateway.clone()));

        Self::new()
            .register(Arc::new(CustomerEventHandler::new(
                store.clone(),
                resolver.clone(),
            )))
            .register(Arc::new(SubscriptionEventHandler::new(
                store.clone(),
                resolver.clone(),
                catalog.clone(),
            )))
            .register(Arc::new(InvoiceEventHandler::new(
                store.clone(),
                resolver.clone(),
            )))
            .register(Arc::new(PaymentMethodEventHandler::new(
                store.clone(),
                resolver.clone(),
            )))
            .register(Arc::new(CheckoutEventHandler::new(
                store, resolver, gateway, catalog,
            )))
    }

    pub fn handled_types(&self) -> Vec<StripeEventType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

#[async_trait]
impl WebhookDispatcher for BillingEventDispatcher {
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler> {
        self.handlers.get(event_type).map(|h| h.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{event, Harness, T0};
    use super::*;
    use crate::domain::billing::WebhookError;
    use serde_json::json;

    fn dispatcher(h: &Harness) -> BillingEventDispatcher {
        BillingEventDispatcher::with_sync_handlers(
            h.store.clone(),
            h.gateway.clone(),
            h.catalog.clone(),
        )
    }

    #[tokio::test]
    async fn every_handled_type_has_a_handler() {
        let h = Harness::new().await;
        let d = dispatcher(&h);

        for event_type in StripeEventType::HANDLED {
            assert!(d.get_handler(&event_type).is_some(), "{:?}", event_type);
        }
        assert_eq!(d.handled_types().len(), StripeEventType::HANDLED.len());
        assert!(d.get_handler(&StripeEventType::Unknown).is_none());
    }

    #[tokio::test]
    async fn unknown_types_are_ignored() {
        let h = Harness::new().await;

        let err = dispatcher(&h)
            .dispatch(&event("evt_1", "charge.refunded", T0, json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Ignored(_)));
    }

    #[tokio::test]
    async fn invoice_paid_alias_reaches_invoice_handler() {
        let h = Harness::new().await;
        let object = json!({
            "id": "in_1",
            "customer": "cus_1",
            "customer_email": "pat@example.com",
            "subscription": null,
            "amount_paid": 100,
            "amount_due": 100
        });

        dispatcher(&h)
            .dispatch(&event("evt_1", "invoice.paid", T0, object))
            .await
            .unwrap();

        assert!(h.store.invoice("in_1").await.is_some());
    }

    #[tokio::test]
    async fn malformed_object_is_a_parse_error() {
        let h = Harness::new().await;

        let err = dispatcher(&h)
            .dispatch(&event("evt_1", "customer.subscription.created", T0, json!({"id": 7})))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::ParseError(_)));
        assert!(err.is_dead_letter());
    }
}
