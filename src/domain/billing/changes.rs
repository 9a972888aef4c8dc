//! Change sets produced by event handlers and committed atomically.
//!
//! A handler never writes to a store directly. It describes the effect of an
//! event as a `ChangeSet`; the billing store applies the whole set in one
//! transaction and enqueues the document projection alongside it.

use chrono::{DateTime, Utc};

use super::plan::PlanTier;
use super::status::{AccessStatus, SubscriptionStatus};
use crate::domain::foundation::UserId;

/// Customer id to user id mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub user_id: UserId,
    pub email: Option<String>,
}

/// Mirror of a Stripe subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub customer_id: String,
    pub user_id: UserId,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub plan: Option<PlanTier>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Provider time of the event that produced this row; older events never overwrite.
    pub last_event_at: DateTime<Utc>,
}

/// Mirror of a Stripe invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub user_id: UserId,
    pub subscription_id: Option<String>,
    pub status: Option<String>,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub currency: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub hosted_invoice_url: Option<String>,
    pub last_event_at: DateTime<Utc>,
}

/// Mirror of an attached payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethodRecord {
    pub payment_method_id: String,
    pub customer_id: String,
    pub user_id: UserId,
    pub method_type: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub card_exp_month: Option<i32>,
    pub card_exp_year: Option<i32>,
    /// Provider time of the attach; a later detach wins over it.
    pub last_event_at: DateTime<Utc>,
}

/// Mirror of a completed checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRecord {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub user_id: UserId,
    pub subscription_id: Option<String>,
    pub mode: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

/// Summary fields derived from the user's current subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSummaryUpdate {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: AccessStatus,
    pub plan: Option<PlanTier>,
    pub quota: i32,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// One effect of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingChange {
    LinkCustomer(CustomerRecord),
    UpsertSubscription(SubscriptionRecord),
    UpsertInvoice(InvoiceRecord),
    UpsertPaymentMethod(PaymentMethodRecord),
    DetachPaymentMethod {
        payment_method_id: String,
        detached_at: DateTime<Utc>,
    },
    /// Makes one payment method the customer's only default.
    SetDefaultPaymentMethod {
        customer_id: String,
        payment_method_id: String,
    },
    UpsertCheckoutSession(CheckoutSessionRecord),
    /// Replace the user summary with the subscription's state.
    ApplySubscription(SubscriptionSummaryUpdate),
    /// The subscription ended; only affects the user if it is their current one.
    EndSubscription { subscription_id: String },
    /// Start a new usage period. Keyed by period start, so replays are no-ops.
    ResetUsage { period_start: DateTime<Utc> },
    /// Status change caused by one subscription; ignored when the user has
    /// moved on to another.
    SetAccessStatus {
        subscription_id: String,
        status: AccessStatus,
    },
}

impl BillingChange {
    /// True for changes that rewrite the denormalized user summary.
    pub fn touches_summary(&self) -> bool {
        matches!(
            self,
            BillingChange::LinkCustomer(_)
                | BillingChange::ApplySubscription(_)
                | BillingChange::EndSubscription { .. }
                | BillingChange::ResetUsage { .. }
                | BillingChange::SetAccessStatus { .. }
        )
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingChange::LinkCustomer(_) => "link_customer",
            BillingChange::UpsertSubscription(_) => "upsert_subscription",
            BillingChange::UpsertInvoice(_) => "upsert_invoice",
            BillingChange::UpsertPaymentMethod(_) => "upsert_payment_method",
            BillingChange::DetachPaymentMethod { .. } => "detach_payment_method",
            BillingChange::SetDefaultPaymentMethod { .. } => "set_default_payment_method",
            BillingChange::UpsertCheckoutSession(_) => "upsert_checkout_session",
            BillingChange::ApplySubscription(_) => "apply_subscription",
            BillingChange::EndSubscription { .. } => "end_subscription",
            BillingChange::ResetUsage { .. } => "reset_usage",
            BillingChange::SetAccessStatus { .. } => "set_access_status",
        }
    }
}

/// All effects of one event on one user, committed atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub user_id: UserId,
    /// Stripe event id; recorded on the outbox entry.
    pub event_id: String,
    /// Provider time of the event, used by the staleness guards.
    pub as_of: DateTime<Utc>,
    pub changes: Vec<BillingChange>,
}

impl ChangeSet {
    pub fn new(user_id: UserId, event_id: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            user_id,
            event_id: event_id.into(),
            as_of,
            changes: Vec::new(),
        }
    }

    pub fn push(&mut self, change: BillingChange) -> &mut Self {
        self.changes.push(change);
        self
    }

    pub fn with(mut self, change: BillingChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn touches_summary(&self) -> bool {
        self.changes.iter().any(BillingChange::touches_summary)
    }
}

/// What a commit actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The user summary row changed; a projection was enqueued.
    pub summary_changed: bool,
    /// Status before and after, when the status changed.
    pub transition: Option<(AccessStatus, AccessStatus)>,
    /// Changes skipped by a guard (stale event, not the current subscription, replay).
    pub skipped: Vec<&'static str>,
}
