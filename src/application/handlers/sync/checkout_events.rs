//! CheckoutEventHandler - checkout.session.completed.
//!
//! Records the session and links the customer. Subscription checkouts also
//! fetch the new subscription from Stripe and apply it, so access starts
//! even if the subscription events arrive late.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::commit_changes;
use super::identity_resolver::{customer_link, IdentityResolver};
use super::subscription_events::subscription_changes;
use crate::domain::billing::{
    BillingChange, ChangeSet, CheckoutSessionRecord, PlanCatalog, StripeCheckoutSession,
    StripeEvent, StripeEventType, WebhookError, WebhookEventHandler,
};
use crate::ports::{BillingStore, StripeGateway};

pub struct CheckoutEventHandler {
    store: Arc<dyn BillingStore>,
    resolver: Arc<IdentityResolver>,
    gateway: Arc<dyn StripeGateway>,
    catalog: Arc<PlanCatalog>,
}

impl CheckoutEventHandler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        resolver: Arc<IdentityResolver>,
        gateway: Arc<dyn StripeGateway>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            store,
            resolver,
            gateway,
            catalog,
        }
    }
}

#[async_trait]
impl WebhookEventHandler for CheckoutEventHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::CheckoutSessionCompleted]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let session: StripeCheckoutSession = event.object_as()?;
        let resolved = self.resolver.resolve(&session.identity_hints()).await?;
        let as_of = event.occurred_at();

        let mut changes = ChangeSet::new(resolved.user_id.clone(), &event.id, as_of);
        if let Some(link) = customer_link(&resolved) {
            changes.push(link);
        }
        changes.push(BillingChange::UpsertCheckoutSession(CheckoutSessionRecord {
            session_id: session.id.clone(),
            customer_id: session.customer_id().map(str::to_string),
            user_id: resolved.user_id.clone(),
            subscription_id: session.subscription_id().map(str::to_string),
            mode: session.mode.clone(),
            status: session.status.clone(),
            payment_status: session.payment_status.clone(),
        }));

        if let Some(subscription_id) = session.subscription_id() {
            match self.gateway.get_subscription(subscription_id).await? {
                Some(subscription) => {
                    for change in
                        subscription_changes(&subscription, &resolved.user_id, &self.catalog, as_of)?
                    {
                        changes.push(change);
                    }
                }
                None => warn!(
                    event_id = %event.id,
                    subscription_id = %subscription_id,
                    "Checkout subscription not found in Stripe, waiting for subscription events"
                ),
            }
        }

        commit_changes(self.store.as_ref(), event, &changes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{event, subscription, Harness, T0};
    use super::*;
    use crate::domain::billing::{AccessStatus, PlanError, PlanTier, StripeSubscription};
    use serde_json::{json, Value};

    fn handler(h: &Harness) -> CheckoutEventHandler {
        CheckoutEventHandler::new(
            h.store.clone(),
            h.resolver.clone(),
            h.gateway.clone(),
            h.catalog.clone(),
        )
    }

    fn session(subscription: Option<&str>) -> Value {
        json!({
            "id": "cs_1",
            "object": "checkout.session",
            "customer": "cus_1",
            "customer_details": {"email": "pat@example.com"},
            "client_reference_id": "uid-1",
            "subscription": subscription,
            "mode": "subscription",
            "status": "complete",
            "payment_status": "paid",
            "metadata": {}
        })
    }

    async fn stripe_has(h: &Harness, price: &str) {
        let sub: StripeSubscription =
            serde_json::from_value(subscription("sub_1", "cus_1", "active", price)).unwrap();
        h.gateway.add_subscription(sub).await;
    }

    #[tokio::test]
    async fn completed_subscription_checkout_activates_user() {
        let h = Harness::new().await;
        stripe_has(&h, "price_enterprise_yearly").await;

        handler(&h)
            .handle(&event("evt_1", "checkout.session.completed", T0, session(Some("sub_1"))))
            .await
            .unwrap();

        let user = h.user().await;
        assert_eq!(user.summary.status, AccessStatus::Active);
        assert_eq!(user.summary.plan, Some(PlanTier::Enterprise));
        assert_eq!(user.summary.quota, 25);
        let stored = h.store.checkout_session("cs_1").await.unwrap();
        assert_eq!(stored.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(h.store.customer("cus_1").await.unwrap().user_id.as_str(), "uid-1");
    }

    #[tokio::test]
    async fn checkout_with_unknown_price_records_nothing() {
        let h = Harness::new().await;
        stripe_has(&h, "price_unknown").await;

        let err = handler(&h)
            .handle(&event("evt_1", "checkout.session.completed", T0, session(Some("sub_1"))))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Plan(PlanError::UnknownPrice(_))));
        assert!(h.store.checkout_session("cs_1").await.is_none());
    }

    #[tokio::test]
    async fn missing_subscription_still_records_session() {
        let h = Harness::new().await;

        handler(&h)
            .handle(&event("evt_1", "checkout.session.completed", T0, session(Some("sub_404"))))
            .await
            .unwrap();

        assert!(h.store.checkout_session("cs_1").await.is_some());
        assert_eq!(h.user().await.summary.quota, 0);
    }
}
