//! Stripe webhook event envelope.
//!
//! Only the envelope is typed. `data.object` stays a JSON value until the
//! handler for the event type decodes it with [`StripeEvent::object_as`].

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::webhook_errors::WebhookError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// `evt_...`; the idempotency key.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds. Orders events that touch the same object.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    /// Absent on some CLI-generated fixtures.
    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,

    /// Pre-change values, present on `*.updated` and `payment_method.detached`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    pub fn is_live(&self) -> bool {
        self.livemode
    }

    /// When Stripe created the event. Out-of-range timestamps fall back to now.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match Utc.timestamp_opt(self.created, 0) {
            chrono::LocalResult::Single(at) => at,
            _ => Utc::now(),
        }
    }

    /// Decodes `data.object` as `T`.
    pub fn object_as<T: DeserializeOwned>(&self) -> Result<T, WebhookError> {
        T::deserialize(&self.data.object).map_err(|e| {
            WebhookError::ParseError(format!("{} payload: {}", self.event_type, e))
        })
    }

    pub fn parsed_type(&self) -> StripeEventType {
        StripeEventType::from_str(&self.event_type)
    }
}

/// Event types with a registered handler. Everything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    CustomerCreated,
    CustomerUpdated,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    PaymentMethodAttached,
    PaymentMethodDetached,
    CheckoutSessionCompleted,
    Unknown,
}

/// Canonical wire name for each handled type.
const NAMES: [(StripeEventType, &str); 10] = [
    (StripeEventType::CustomerCreated, "customer.created"),
    (StripeEventType::CustomerUpdated, "customer.updated"),
    (StripeEventType::SubscriptionCreated, "customer.subscription.created"),
    (StripeEventType::SubscriptionUpdated, "customer.subscription.updated"),
    (StripeEventType::SubscriptionDeleted, "customer.subscription.deleted"),
    (StripeEventType::InvoicePaymentSucceeded, "invoice.payment_succeeded"),
    (StripeEventType::InvoicePaymentFailed, "invoice.payment_failed"),
    (StripeEventType::PaymentMethodAttached, "payment_method.attached"),
    (StripeEventType::PaymentMethodDetached, "payment_method.detached"),
    (StripeEventType::CheckoutSessionCompleted, "checkout.session.completed"),
];

/// Extra names that map onto a handled type.
const ALIASES: [(&str, StripeEventType); 1] =
    [("invoice.paid", StripeEventType::InvoicePaymentSucceeded)];

impl StripeEventType {
    pub const HANDLED: [StripeEventType; 10] = [
        Self::CustomerCreated,
        Self::CustomerUpdated,
        Self::SubscriptionCreated,
        Self::SubscriptionUpdated,
        Self::SubscriptionDeleted,
        Self::InvoicePaymentSucceeded,
        Self::InvoicePaymentFailed,
        Self::PaymentMethodAttached,
        Self::PaymentMethodDetached,
        Self::CheckoutSessionCompleted,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(kind, _)| *kind)
            .or_else(|| ALIASES.iter().find(|(alias, _)| *alias == s).map(|(_, kind)| *kind))
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        NAMES
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
pub struct StripeEventBuilder {
    event: StripeEvent,
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self {
            event: StripeEvent {
                id: "evt_test_123".to_string(),
                event_type: "customer.created".to_string(),
                created: Utc::now().timestamp(),
                data: StripeEventData {
                    object: serde_json::json!({}),
                    previous_attributes: None,
                },
                livemode: false,
                api_version: Some("2023-10-16".to_string()),
            },
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.event.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event.event_type = event_type.into();
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.event.created = created;
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.event.data.object = object;
        self
    }

    pub fn previous_attributes(mut self, attrs: serde_json::Value) -> Self {
        self.event.data.previous_attributes = Some(attrs);
        self
    }

    pub fn livemode(mut self, livemode: bool) -> Self {
        self.event.livemode = livemode;
        self
    }

    pub fn build(self) -> StripeEvent {
        self.event
    }
}
