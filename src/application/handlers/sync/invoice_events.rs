//! InvoiceEventHandler - invoice.payment_succeeded (alias invoice.paid) / invoice.payment_failed.
//!
//! A paid subscription invoice starts a new usage period. The reset is keyed
//! by the period start, so replays and late deliveries change nothing.
//! A failed payment moves the user to `past_due`.

use std::sync::Arc;

use async_trait::async_trait;

use super::commit_changes;
use super::identity_resolver::{customer_link, IdentityResolver};
use crate::domain::billing::{
    AccessStatus, BillingChange, ChangeSet, InvoiceRecord, StripeEvent, StripeEventType,
    StripeInvoice, WebhookError, WebhookEventHandler,
};
use crate::ports::BillingStore;

pub struct InvoiceEventHandler {
    store: Arc<dyn BillingStore>,
    resolver: Arc<IdentityResolver>,
}

impl InvoiceEventHandler {
    pub fn new(store: Arc<dyn BillingStore>, resolver: Arc<IdentityResolver>) -> Self {
        Self { store, resolver }
    }
}

#[async_trait]
impl WebhookEventHandler for InvoiceEventHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::InvoicePaymentSucceeded,
            StripeEventType::InvoicePaymentFailed,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let invoice: StripeInvoice = event.object_as()?;
        let resolved = self.resolver.resolve(&invoice.identity_hints()).await?;
        let as_of = event.occurred_at();
        let period = invoice.service_period();

        let mut changes = ChangeSet::new(resolved.user_id.clone(), &event.id, as_of);
        if let Some(link) = customer_link(&resolved) {
            changes.push(link);
        }
        changes.push(BillingChange::UpsertInvoice(InvoiceRecord {
            invoice_id: invoice.id.clone(),
            customer_id: invoice.customer_id().map(str::to_string),
            user_id: resolved.user_id.clone(),
            subscription_id: invoice.subscription_id().map(str::to_string),
            status: invoice.status.clone(),
            amount_due: invoice.amount_due,
            amount_paid: invoice.amount_paid,
            currency: invoice.currency.clone(),
            period_start: period.map(|(start, _)| start),
            period_end: period.map(|(_, end)| end),
            hosted_invoice_url: invoice.hosted_invoice_url.clone(),
            last_event_at: as_of,
        }));

        // One-off invoices only get the row
        if let Some(subscription_id) = invoice.subscription_id() {
            match event.parsed_type() {
                StripeEventType::InvoicePaymentSucceeded => {
                    if let Some((period_start, _)) = period {
                        changes.push(BillingChange::ResetUsage { period_start });
                    }
                }
                StripeEventType::InvoicePaymentFailed => {
                    changes.push(BillingChange::SetAccessStatus {
                        subscription_id: subscription_id.to_string(),
                        status: AccessStatus::PastDue,
                    });
                }
                _ => {}
            }
        }

        commit_changes(self.store.as_ref(), event, &changes).await?;
        Ok(())
    }
}
