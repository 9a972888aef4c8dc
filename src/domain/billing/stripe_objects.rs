//! Stripe API objects as they arrive in webhook payloads.
//!
//! Only the fields the synchronizer projects are modelled. Unknown fields are
//! ignored so newer API versions keep parsing.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::identity::IdentityHints;
use super::status::SubscriptionStatus;

/// A reference that Stripe sends either as a bare id or as an expanded object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

/// Converts a Stripe Unix timestamp.
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ════════════════════════════════════════════════════════════════════════════════
// Customer
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    pub email: Option<String>,

    pub name: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub invoice_settings: Option<InvoiceSettings>,

    /// Whether the customer has been deleted.
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceSettings {
    pub default_payment_method: Option<Expandable>,
}

impl StripeCustomer {
    pub fn identity_hints(&self) -> IdentityHints {
        IdentityHints::from_metadata(&self.metadata)
            .with_customer(Some(&self.id))
            .with_email(self.email.as_deref())
    }

    pub fn default_payment_method(&self) -> Option<&str> {
        self.invoice_settings
            .as_ref()
            .and_then(|s| s.default_payment_method.as_ref())
            .map(Expandable::id)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Customer owning this subscription.
    pub customer: Expandable,

    pub status: SubscriptionStatus,

    /// Current period start (Unix timestamp).
    pub current_period_start: Option<i64>,

    /// Current period end (Unix timestamp).
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    /// When cancellation was requested (Unix timestamp).
    pub canceled_at: Option<i64>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
}

/// Stripe list envelope (`{"object": "list", "data": [...]}`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: StripePrice,
    /// Newer API versions moved the period onto the item.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

/// Stripe Price object (embedded in subscription items).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePrice {
    pub id: String,
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
}

impl StripeSubscription {
    pub fn customer_id(&self) -> &str {
        self.customer.id()
    }

    /// Price of the first item. Subscriptions here carry exactly one plan.
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_start))
            .and_then(from_unix)
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
            .and_then(from_unix)
    }

    pub fn identity_hints(&self) -> IdentityHints {
        IdentityHints::from_metadata(&self.metadata).with_customer(Some(self.customer_id()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Invoice
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Invoice object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    pub customer: Option<Expandable>,

    pub customer_email: Option<String>,

    /// Associated subscription, absent for one-off invoices.
    pub subscription: Option<Expandable>,

    /// Invoice status (draft, open, paid, void, uncollectible).
    pub status: Option<String>,

    #[serde(default)]
    pub amount_paid: i64,

    #[serde(default)]
    pub amount_due: i64,

    pub currency: Option<String>,

    pub period_start: Option<i64>,

    pub period_end: Option<i64>,

    pub hosted_invoice_url: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Carries the subscription metadata on recent API versions.
    pub subscription_details: Option<SubscriptionDetails>,

    #[serde(default)]
    pub lines: StripeList<StripeInvoiceLineItem>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Single invoice line item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoiceLineItem {
    pub id: String,
    pub period: Option<StripePeriod>,
}

/// Billing period on an invoice line.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StripePeriod {
    pub start: i64,
    pub end: i64,
}

impl StripeInvoice {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(Expandable::id)
    }

    /// The subscription period the invoice pays for.
    ///
    /// Subscription invoices put the service period on the line items; the
    /// invoice-level `period_*` fields describe the previous period.
    pub fn service_period(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let line_period = self
            .lines
            .data
            .iter()
            .filter_map(|line| line.period)
            .max_by_key(|p| p.start);
        let (start, end) = match line_period {
            Some(p) => (p.start, p.end),
            None => (self.period_start?, self.period_end?),
        };
        Some((from_unix(start)?, from_unix(end)?))
    }

    pub fn identity_hints(&self) -> IdentityHints {
        let mut hints = IdentityHints::from_metadata(&self.metadata);
        if hints.user_id.is_none() {
            if let Some(details) = &self.subscription_details {
                hints = IdentityHints::from_metadata(&details.metadata);
            }
        }
        hints
            .with_customer(self.customer_id())
            .with_email(self.customer_email.as_deref())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Payment method
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe PaymentMethod object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePaymentMethod {
    /// Unique identifier (pm_...).
    pub id: String,

    /// Null once detached.
    pub customer: Option<Expandable>,

    #[serde(rename = "type")]
    pub method_type: String,

    pub card: Option<StripeCard>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub billing_details: Option<BillingDetails>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BillingDetails {
    pub email: Option<String>,
}

impl StripePaymentMethod {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    pub fn identity_hints(&self) -> IdentityHints {
        IdentityHints::from_metadata(&self.metadata)
            .with_customer(self.customer_id())
            .with_email(self.billing_details.as_ref().and_then(|b| b.email.as_deref()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout session
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    pub customer: Option<Expandable>,

    pub customer_email: Option<String>,

    pub customer_details: Option<CustomerDetails>,

    /// Set by the front-end to the signed-in user's id.
    pub client_reference_id: Option<String>,

    pub subscription: Option<Expandable>,

    /// Payment mode (payment, setup, subscription).
    pub mode: String,

    /// Session status (open, complete, expired).
    pub status: Option<String>,

    pub payment_status: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl StripeCheckoutSession {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(Expandable::id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(Expandable::id)
    }

    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }

    pub fn identity_hints(&self) -> IdentityHints {
        IdentityHints::from_metadata(&self.metadata)
            .with_user_id(self.client_reference_id.as_deref())
            .with_customer(self.customer_id())
            .with_email(self.email())
    }
}
