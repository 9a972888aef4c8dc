//! Sync handlers - Apply verified Stripe events to the billing store.
//!
//! Each handler resolves the event's user, describes the effect as a
//! `ChangeSet` and commits it in one transaction. The user document is
//! projected later by the relay.
//!
//! ## Handlers
//! - `CustomerEventHandler` - customer.created / customer.updated
//! - `SubscriptionEventHandler` - customer.subscription.*
//! - `InvoiceEventHandler` - invoice.payment_succeeded / invoice.payment_failed
//! - `PaymentMethodEventHandler` - payment_method.attached / detached
//! - `CheckoutEventHandler` - checkout.session.completed

mod checkout_events;
mod customer_events;
mod dispatcher;
mod identity_resolver;
mod invoice_events;
mod payment_method_events;
mod subscription_events;

#[cfg(test)]
mod test_support;

pub use checkout_events::CheckoutEventHandler;
pub use customer_events::CustomerEventHandler;
pub use dispatcher::BillingEventDispatcher;
pub use identity_resolver::{customer_link, IdentityResolver};
pub use invoice_events::InvoiceEventHandler;
pub use payment_method_events::PaymentMethodEventHandler;
pub use subscription_events::SubscriptionEventHandler;

use tracing::{info, warn};

use crate::domain::billing::{ChangeSet, CommitOutcome, StripeEvent, WebhookError};
use crate::domain::foundation::StateMachine;
use crate::ports::BillingStore;

/// Commits a change set, logging guard skips and unexpected status transitions.
async fn commit_changes(
    store: &dyn BillingStore,
    event: &StripeEvent,
    changes: &ChangeSet,
) -> Result<CommitOutcome, WebhookError> {
    let outcome = store.commit(changes).await?;

    if !outcome.skipped.is_empty() {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            user_id = %changes.user_id,
            skipped = ?outcome.skipped,
            "Summary changes skipped by guard"
        );
    }

    if let Some((from, to)) = outcome.transition {
        // The provider is authoritative; unexpected transitions are applied anyway
        if !from.can_transition_to(&to) {
            warn!(
                event_id = %event.id,
                user_id = %changes.user_id,
                from = %from,
                to = %to,
                "Unexpected subscription status transition"
            );
        } else {
            info!(user_id = %changes.user_id, from = %from, to = %to, "Subscription status changed");
        }
    }

    Ok(outcome)
}
