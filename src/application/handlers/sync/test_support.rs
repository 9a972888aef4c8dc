//! Shared fixtures for the sync handler tests.

use std::sync::Arc;

use serde_json::{json, Value};

use super::IdentityResolver;
use crate::adapters::memory::{InMemoryBillingStore, InMemoryStripeGateway};
use crate::domain::billing::{PlanCatalog, StripeEvent, StripeEventBuilder, UserAccount};
use crate::domain::foundation::UserId;

/// 2024-01-01T00:00:00Z
pub const T0: i64 = 1_704_067_200;
pub const DAY: i64 = 86_400;

pub struct Harness {
    pub store: Arc<InMemoryBillingStore>,
    pub gateway: Arc<InMemoryStripeGateway>,
    pub resolver: Arc<IdentityResolver>,
    pub catalog: Arc<PlanCatalog>,
}

impl Harness {
    /// A store holding `uid-1` (pat@example.com).
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        let gateway = Arc::new(InMemoryStripeGateway::new());
        store
            .insert_user(UserAccount::new(
                UserId::new("uid-1").unwrap(),
                Some("pat@example.com".to_string()),
            ))
            .await;
        let resolver = Arc::new(IdentityResolver::new(store.clone(), gateway.clone()));
        Self {
            store,
            gateway,
            resolver,
            catalog: Arc::new(PlanCatalog::default()),
        }
    }

    pub async fn user(&self) -> UserAccount {
        self.store.user("uid-1").await.unwrap()
    }
}

pub fn event(id: &str, event_type: &str, created: i64, object: Value) -> StripeEvent {
    StripeEventBuilder::new()
        .id(id)
        .event_type(event_type)
        .created(created)
        .object(object)
        .build()
}

pub fn subscription(id: &str, customer: &str, status: &str, price: &str) -> Value {
    json!({
        "id": id,
        "object": "subscription",
        "customer": customer,
        "status": status,
        "current_period_start": T0,
        "current_period_end": T0 + 30 * DAY,
        "cancel_at_period_end": false,
        "metadata": {},
        "items": {
            "object": "list",
            "data": [{"id": "si_1", "price": {"id": price, "unit_amount": 4900, "currency": "usd"}}]
        }
    })
}

pub fn invoice(id: &str, customer: &str, subscription: Option<&str>, period_start: i64) -> Value {
    json!({
        "id": id,
        "object": "invoice",
        "customer": customer,
        "customer_email": null,
        "subscription": subscription,
        "status": "paid",
        "amount_paid": 4900,
        "amount_due": 4900,
        "currency": "usd",
        "lines": {
            "object": "list",
            "data": [{"id": "il_1", "period": {"start": period_start, "end": period_start + 30 * DAY}}]
        }
    })
}
