//! StripeGateway port - Read access to the Stripe API.
//!
//! Used when a webhook object lacks data the synchronizer needs: a customer's
//! email for identity resolution, or the subscription behind a checkout session.

use async_trait::async_trait;

use crate::domain::billing::{StripeCustomer, StripeSubscription};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait StripeGateway: Send + Sync {
    /// Returns `None` for unknown or deleted customers.
    async fn get_customer(&self, customer_id: &str) -> Result<Option<StripeCustomer>, DomainError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<StripeSubscription>, DomainError>;
}
