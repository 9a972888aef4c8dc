//! PaymentMethodEventHandler - payment_method.attached / payment_method.detached.

use std::sync::Arc;

use async_trait::async_trait;

use super::commit_changes;
use super::identity_resolver::{customer_link, IdentityResolver};
use crate::domain::billing::{
    BillingChange, ChangeSet, IdentityHints, PaymentMethodRecord, StripeEvent, StripeEventType,
    StripePaymentMethod, WebhookError, WebhookEventHandler,
};
use crate::ports::BillingStore;

pub struct PaymentMethodEventHandler {
    store: Arc<dyn BillingStore>,
    resolver: Arc<IdentityResolver>,
}

impl PaymentMethodEventHandler {
    pub fn new(store: Arc<dyn BillingStore>, resolver: Arc<IdentityResolver>) -> Self {
        Self { store, resolver }
    }

    async fn attached(
        &self,
        event: &StripeEvent,
        method: StripePaymentMethod,
    ) -> Result<(), WebhookError> {
        let customer_id = method
            .customer_id()
            .ok_or(WebhookError::MissingField("customer"))?
            .to_string();
        let resolved = self.resolver.resolve(&method.identity_hints()).await?;

        let mut changes = ChangeSet::new(resolved.user_id.clone(), &event.id, event.occurred_at());
        if let Some(link) = customer_link(&resolved) {
            changes.push(link);
        }
        let card = method.card.as_ref();
        changes.push(BillingChange::UpsertPaymentMethod(PaymentMethodRecord {
            payment_method_id: method.id.clone(),
            customer_id,
            user_id: resolved.user_id.clone(),
            method_type: method.method_type.clone(),
            card_brand: card.and_then(|c| c.brand.clone()),
            card_last4: card.and_then(|c| c.last4.clone()),
            card_exp_month: card.and_then(|c| c.exp_month),
            card_exp_year: card.and_then(|c| c.exp_year),
            last_event_at: event.occurred_at(),
        }));

        commit_changes(self.store.as_ref(), event, &changes).await?;
        Ok(())
    }

    async fn detached(
        &self,
        event: &StripeEvent,
        method: StripePaymentMethod,
    ) -> Result<(), WebhookError> {
        // The object no longer names a customer; the previous one is in previous_attributes
        let previous_customer = event
            .data
            .previous_attributes
            .as_ref()
            .and_then(|attrs| attrs.get("customer"))
            .and_then(|c| c.as_str().or_else(|| c.get("id").and_then(|id| id.as_str())));
        let hints = IdentityHints::from_metadata(&method.metadata).with_customer(previous_customer);
        if hints.is_empty() {
            return Err(WebhookError::Ignored(format!(
                "detached payment method {} names no previous customer",
                method.id
            )));
        }
        let resolved = self.resolver.resolve(&hints).await?;

        let changes = ChangeSet::new(resolved.user_id, &event.id, event.occurred_at()).with(
            BillingChange::DetachPaymentMethod {
                payment_method_id: method.id.clone(),
                detached_at: event.occurred_at(),
            },
        );

        commit_changes(self.store.as_ref(), event, &changes).await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for PaymentMethodEventHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::PaymentMethodAttached,
            StripeEventType::PaymentMethodDetached,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let method: StripePaymentMethod = event.object_as()?;
        match event.parsed_type() {
            StripeEventType::PaymentMethodDetached => self.detached(event, method).await,
            _ => self.attached(event, method).await,
        }
    }
}
