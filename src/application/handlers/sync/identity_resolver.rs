//! IdentityResolver - Works out which user a Stripe object belongs to.
//!
//! Resolution order, first match wins:
//! 1. User id from metadata (or a checkout `client_reference_id`), if that user exists
//! 2. Existing customer to user mapping
//! 3. User lookup by email, fetching the customer from Stripe when the event has none
//!
//! No user is ever invented. A miss is a `ResolutionError` and the event is
//! dead-lettered.

use std::sync::Arc;

use tracing::debug;

use crate::domain::billing::{
    BillingChange, CustomerRecord, IdentityHints, ResolutionError, ResolvedBy, ResolvedIdentity,
    WebhookError,
};
use crate::domain::foundation::UserId;
use crate::ports::{BillingStore, StripeGateway};

pub struct IdentityResolver {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn StripeGateway>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn StripeGateway>) -> Self {
        Self { store, gateway }
    }

    /// Resolves the hints to an existing user.
    ///
    /// Store and Stripe failures are returned as retryable errors; only a
    /// definite miss is a `ResolutionError`.
    pub async fn resolve(&self, hints: &IdentityHints) -> Result<ResolvedIdentity, WebhookError> {
        if hints.is_empty() {
            return Err(ResolutionError::NoHints.into());
        }

        if let Some(raw) = hints.user_id.as_deref() {
            // A malformed id in metadata is a miss on this rung, not a failure
            if let Ok(user_id) = UserId::new(raw) {
                if self.store.find_user(&user_id).await?.is_some() {
                    return Ok(self.resolved(user_id, ResolvedBy::Metadata, hints, None));
                }
                debug!(user_id = %raw, "Metadata user id does not exist");
            }
        }

        if let Some(customer_id) = hints.customer_id.as_deref() {
            if let Some(user_id) = self.store.find_user_by_customer(customer_id).await? {
                return Ok(self.resolved(user_id, ResolvedBy::CustomerMapping, hints, None));
            }
        }

        let email = match (&hints.email, hints.customer_id.as_deref()) {
            (Some(email), _) => Some(email.clone()),
            (None, Some(customer_id)) => self
                .gateway
                .get_customer(customer_id)
                .await?
                .and_then(|c| c.email)
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            (None, None) => None,
        };

        if let Some(email) = email.as_deref() {
            if let Some(user) = self.store.find_user_by_email(email).await? {
                return Ok(self.resolved(user.id, ResolvedBy::Email, hints, Some(email)));
            }
        }

        Err(ResolutionError::NoMatch {
            customer_id: hints.customer_id.clone(),
            email,
        }
        .into())
    }

    fn resolved(
        &self,
        user_id: UserId,
        resolved_by: ResolvedBy,
        hints: &IdentityHints,
        fetched_email: Option<&str>,
    ) -> ResolvedIdentity {
        debug!(user_id = %user_id, resolved_by = resolved_by.as_str(), "Identity resolved");
        ResolvedIdentity {
            user_id,
            resolved_by,
            customer_id: hints.customer_id.clone(),
            email: hints
                .email
                .clone()
                .or_else(|| fetched_email.map(str::to_string)),
        }
    }
}

/// The customer mapping change for a resolution, when one is needed.
pub fn customer_link(resolved: &ResolvedIdentity) -> Option<BillingChange> {
    if !resolved.needs_customer_link() {
        return None;
    }
    resolved.customer_id.as_ref().map(|customer_id| {
        BillingChange::LinkCustomer(CustomerRecord {
            customer_id: customer_id.clone(),
            user_id: resolved.user_id.clone(),
            email: resolved.email.clone(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBillingStore, InMemoryStripeGateway};
    use crate::domain::billing::{ChangeSet, StripeCustomer, UserAccount};
    use chrono::Utc;
    use std::collections::HashMap;

    struct Fixture {
        store: Arc<InMemoryBillingStore>,
        gateway: Arc<InMemoryStripeGateway>,
        resolver: IdentityResolver,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        let gateway = Arc::new(InMemoryStripeGateway::new());
        store
            .insert_user(UserAccount::new(
                UserId::new("uid-1").unwrap(),
                Some("Pat@Example.com".to_string()),
            ))
            .await;
        let resolver = IdentityResolver::new(store.clone(), gateway.clone());
        Fixture {
            store,
            gateway,
            resolver,
        }
    }

    async fn link(store: &InMemoryBillingStore, customer_id: &str, user: &str) {
        let user_id = UserId::new(user).unwrap();
        store
            .commit(&ChangeSet::new(user_id.clone(), "evt_link", Utc::now()).with(
                BillingChange::LinkCustomer(CustomerRecord {
                    customer_id: customer_id.to_string(),
                    user_id,
                    email: None,
                }),
            ))
            .await
            .unwrap();
    }

    fn hints(user: Option<&str>, customer: Option<&str>, email: Option<&str>) -> IdentityHints {
        IdentityHints::default()
            .with_user_id(user)
            .with_customer(customer)
            .with_email(email)
    }

    #[tokio::test]
    async fn metadata_user_id_wins() {
        let f = fixture().await;

        let resolved = f
            .resolver
            .resolve(&hints(Some("uid-1"), Some("cus_new"), None))
            .await
            .unwrap();

        assert_eq!(resolved.user_id.as_str(), "uid-1");
        assert_eq!(resolved.resolved_by, ResolvedBy::Metadata);
        assert!(customer_link(&resolved).is_some());
    }

    #[tokio::test]
    async fn unknown_metadata_user_falls_through_to_mapping() {
        let f = fixture().await;
        link(&f.store, "cus_1", "uid-1").await;

        let resolved = f
            .resolver
            .resolve(&hints(Some("uid-gone"), Some("cus_1"), None))
            .await
            .unwrap();

        assert_eq!(resolved.resolved_by, ResolvedBy::CustomerMapping);
        assert!(customer_link(&resolved).is_none());
    }

    #[tokio::test]
    async fn email_match_is_case_insensitive() {
        let f = fixture().await;

        let resolved = f
            .resolver
            .resolve(&hints(None, Some("cus_2"), Some("PAT@example.COM")))
            .await
            .unwrap();

        assert_eq!(resolved.user_id.as_str(), "uid-1");
        assert_eq!(resolved.resolved_by, ResolvedBy::Email);
        match customer_link(&resolved) {
            Some(BillingChange::LinkCustomer(record)) => {
                assert_eq!(record.customer_id, "cus_2");
                assert_eq!(record.email.as_deref(), Some("pat@example.com"));
            }
            other => panic!("expected customer link, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_email_is_fetched_from_stripe() {
        let f = fixture().await;
        f.gateway
            .add_customer(StripeCustomer {
                id: "cus_3".to_string(),
                email: Some("pat@example.com".to_string()),
                name: None,
                metadata: HashMap::new(),
                invoice_settings: None,
                deleted: false,
            })
            .await;

        let resolved = f
            .resolver
            .resolve(&hints(None, Some("cus_3"), None))
            .await
            .unwrap();

        assert_eq!(resolved.resolved_by, ResolvedBy::Email);
        assert_eq!(resolved.email.as_deref(), Some("pat@example.com"));
    }

    #[tokio::test]
    async fn no_match_is_a_resolution_error() {
        let f = fixture().await;

        let err = f
            .resolver
            .resolve(&hints(None, Some("cus_unknown"), Some("nobody@example.com")))
            .await
            .unwrap_err();

        assert!(err.is_dead_letter());
        assert!(matches!(
            err,
            WebhookError::Unresolved(ResolutionError::NoMatch { .. })
        ));
    }

    #[tokio::test]
    async fn empty_hints_are_rejected() {
        let f = fixture().await;

        let err = f.resolver.resolve(&IdentityHints::default()).await.unwrap_err();

        assert!(matches!(err, WebhookError::Unresolved(ResolutionError::NoHints)));
    }
}
