//! CustomerEventHandler - customer.created / customer.updated.
//!
//! Links the customer id to its user and tracks the default payment method.

use std::sync::Arc;

use async_trait::async_trait;

use super::commit_changes;
use super::identity_resolver::IdentityResolver;
use crate::domain::billing::{
    BillingChange, ChangeSet, CustomerRecord, StripeCustomer, StripeEvent, StripeEventType,
    WebhookError, WebhookEventHandler,
};
use crate::ports::BillingStore;

pub struct CustomerEventHandler {
    store: Arc<dyn BillingStore>,
    resolver: Arc<IdentityResolver>,
}

impl CustomerEventHandler {
    pub fn new(store: Arc<dyn BillingStore>, resolver: Arc<IdentityResolver>) -> Self {
        Self { store, resolver }
    }
}

#[async_trait]
impl WebhookEventHandler for CustomerEventHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::CustomerCreated,
            StripeEventType::CustomerUpdated,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let customer: StripeCustomer = event.object_as()?;
        if customer.deleted {
            return Err(WebhookError::Ignored(format!(
                "customer {} is deleted",
                customer.id
            )));
        }

        let resolved = self.resolver.resolve(&customer.identity_hints()).await?;

        // Always relink: the customer event carries the freshest email
        let mut changes = ChangeSet::new(resolved.user_id.clone(), &event.id, event.occurred_at())
            .with(BillingChange::LinkCustomer(CustomerRecord {
                customer_id: customer.id.clone(),
                user_id: resolved.user_id.clone(),
                email: customer
                    .email
                    .as_deref()
                    .map(|e| e.trim().to_lowercase()),
            }));
        if let Some(payment_method_id) = customer.default_payment_method() {
            changes.push(BillingChange::SetDefaultPaymentMethod {
                customer_id: customer.id.clone(),
                payment_method_id: payment_method_id.to_string(),
            });
        }

        commit_changes(self.store.as_ref(), event, &changes).await?;
        Ok(())
    }
}
