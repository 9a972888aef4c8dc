//! SubscriptionEventHandler - customer.subscription.created / updated / deleted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::identity_resolver::{customer_link, IdentityResolver};
use super::commit_changes;
use crate::domain::billing::{
    BillingChange, ChangeSet, PlanCatalog, PlanError, PlanTier, StripeEvent, StripeEventType,
    StripeSubscription, SubscriptionRecord, SubscriptionStatus, SubscriptionSummaryUpdate,
    WebhookError, WebhookEventHandler,
};
use crate::domain::foundation::UserId;
use crate::ports::BillingStore;

pub struct SubscriptionEventHandler {
    store: Arc<dyn BillingStore>,
    resolver: Arc<IdentityResolver>,
    catalog: Arc<PlanCatalog>,
}

impl SubscriptionEventHandler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        resolver: Arc<IdentityResolver>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            store,
            resolver,
            catalog,
        }
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionEventHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::SubscriptionCreated,
            StripeEventType::SubscriptionUpdated,
            StripeEventType::SubscriptionDeleted,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let subscription: StripeSubscription = event.object_as()?;
        if subscription.status == SubscriptionStatus::Unknown {
            warn!(
                event_id = %event.id,
                subscription_id = %subscription.id,
                "Unrecognized subscription status, treating as inactive"
            );
        }

        let resolved = self.resolver.resolve(&subscription.identity_hints()).await?;
        let as_of = event.occurred_at();
        let mut changes = ChangeSet::new(resolved.user_id.clone(), &event.id, as_of);
        if let Some(link) = customer_link(&resolved) {
            changes.push(link);
        }

        if event.parsed_type() == StripeEventType::SubscriptionDeleted {
            // The plan is informational here; an unknown price must not block the cancel
            let tier = subscription
                .price_id()
                .and_then(|price| self.catalog.resolve(price).ok())
                .map(|entry| entry.tier);
            let mut record = subscription_record(&subscription, &resolved.user_id, tier, as_of);
            record.status = SubscriptionStatus::Canceled;
            changes.push(BillingChange::UpsertSubscription(record));
            changes.push(BillingChange::EndSubscription {
                subscription_id: subscription.id.clone(),
            });
        } else {
            for change in
                subscription_changes(&subscription, &resolved.user_id, &self.catalog, as_of)?
            {
                changes.push(change);
            }
        }

        commit_changes(self.store.as_ref(), event, &changes).await?;
        Ok(())
    }
}

/// Row and summary changes for a live subscription.
///
/// Fails with `PlanError` when the price is missing or unknown; nothing is
/// written in that case.
pub(super) fn subscription_changes(
    subscription: &StripeSubscription,
    user_id: &UserId,
    catalog: &PlanCatalog,
    as_of: DateTime<Utc>,
) -> Result<Vec<BillingChange>, PlanError> {
    let price_id = subscription.price_id().ok_or(PlanError::MissingPrice)?;
    let entry = catalog.resolve(price_id)?;
    let grants = subscription.status.grants_quota();

    Ok(vec![
        BillingChange::UpsertSubscription(subscription_record(
            subscription,
            user_id,
            Some(entry.tier),
            as_of,
        )),
        BillingChange::ApplySubscription(SubscriptionSummaryUpdate {
            subscription_id: subscription.id.clone(),
            customer_id: subscription.customer_id().to_string(),
            status: subscription.status.access_status(),
            plan: grants.then_some(entry.tier),
            quota: if grants { entry.quota } else { 0 },
            current_period_end: subscription.period_end(),
            cancel_at_period_end: subscription.cancel_at_period_end,
        }),
    ])
}

fn subscription_record(
    subscription: &StripeSubscription,
    user_id: &UserId,
    plan: Option<PlanTier>,
    as_of: DateTime<Utc>,
) -> SubscriptionRecord {
    SubscriptionRecord {
        subscription_id: subscription.id.clone(),
        customer_id: subscription.customer_id().to_string(),
        user_id: user_id.clone(),
        status: subscription.status,
        price_id: subscription.price_id().map(str::to_string),
        plan,
        current_period_start: subscription.period_start(),
        current_period_end: subscription.period_end(),
        cancel_at_period_end: subscription.cancel_at_period_end,
        canceled_at: subscription
            .canceled_at
            .and_then(crate::domain::billing::from_unix),
        last_event_at: as_of,
    }
}
