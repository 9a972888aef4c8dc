//! In-memory Stripe API stand-in.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{StripeCustomer, StripeSubscription};
use crate::domain::foundation::DomainError;
use crate::ports::StripeGateway;

#[derive(Default)]
pub struct InMemoryStripeGateway {
    customers: RwLock<HashMap<String, StripeCustomer>>,
    subscriptions: RwLock<HashMap<String, StripeSubscription>>,
}

impl InMemoryStripeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_customer(&self, customer: StripeCustomer) {
        self.customers
            .write()
            .await
            .insert(customer.id.clone(), customer);
    }

    pub async fn add_subscription(&self, subscription: StripeSubscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription);
    }
}

#[async_trait]
impl StripeGateway for InMemoryStripeGateway {
    async fn get_customer(&self, customer_id: &str) -> Result<Option<StripeCustomer>, DomainError> {
        Ok(self
            .customers
            .read()
            .await
            .get(customer_id)
            .filter(|c| !c.deleted)
            .cloned())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<StripeSubscription>, DomainError> {
        Ok(self.subscriptions.read().await.get(subscription_id).cloned())
    }
}
