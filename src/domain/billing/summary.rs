//! The denormalized subscription summary kept on each user.
//!
//! Both billing store adapters apply change sets through `UserAccount::apply`,
//! so the ordering and replay guards live in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::changes::{BillingChange, ChangeSet, CommitOutcome};
use super::plan::PlanTier;
use super::status::AccessStatus;
use crate::domain::foundation::UserId;

/// Subscription fields stored on the `users` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSummary {
    pub status: AccessStatus,
    pub plan: Option<PlanTier>,
    pub quota: i32,
    pub used: i32,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    /// Start of the period whose usage `used` counts.
    pub usage_period_start: Option<DateTime<Utc>>,
    /// Provider time of the last subscription-level change applied.
    pub subscription_synced_at: Option<DateTime<Utc>>,
}

/// A user as the synchronizer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    pub email: Option<String>,
    pub summary: SubscriptionSummary,
}

/// Result of applying one change to the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
    Skipped(&'static str),
}

impl UserAccount {
    pub fn new(id: UserId, email: Option<String>) -> Self {
        Self {
            id,
            email,
            summary: SubscriptionSummary::default(),
        }
    }

    fn is_stale(&self, as_of: DateTime<Utc>) -> bool {
        self.summary
            .subscription_synced_at
            .map_or(false, |synced| as_of < synced)
    }

    /// Applies one change. Row-only changes leave the summary untouched.
    pub fn apply(&mut self, change: &BillingChange, as_of: DateTime<Utc>) -> Applied {
        let before = self.summary.clone();
        let s = &mut self.summary;

        match change {
            BillingChange::LinkCustomer(record) => {
                s.stripe_customer_id = Some(record.customer_id.clone());
            }
            BillingChange::ApplySubscription(update) => {
                if self.is_stale(as_of) {
                    return Applied::Skipped("stale_subscription_event");
                }
                let s = &mut self.summary;
                let other_current = s
                    .stripe_subscription_id
                    .as_deref()
                    .map_or(false, |current| current != update.subscription_id);
                // A lapsed old subscription must not clobber the live one
                if other_current && update.status == AccessStatus::Inactive {
                    return Applied::Skipped("not_current_subscription");
                }
                s.status = update.status;
                s.plan = update.plan;
                s.quota = update.quota;
                s.stripe_customer_id = Some(update.customer_id.clone());
                s.stripe_subscription_id = Some(update.subscription_id.clone());
                s.current_period_end = update.current_period_end;
                s.cancel_at_period_end = update.cancel_at_period_end;
                s.subscription_synced_at = Some(as_of);
            }
            BillingChange::EndSubscription { subscription_id } => {
                if self.is_stale(as_of) {
                    return Applied::Skipped("stale_subscription_event");
                }
                let s = &mut self.summary;
                if let Some(current) = s.stripe_subscription_id.as_deref() {
                    if current != subscription_id {
                        return Applied::Skipped("not_current_subscription");
                    }
                }
                s.status = AccessStatus::Inactive;
                s.plan = None;
                s.quota = 0;
                s.stripe_subscription_id = None;
                s.current_period_end = None;
                s.cancel_at_period_end = false;
                s.subscription_synced_at = Some(as_of);
            }
            BillingChange::ResetUsage { period_start } => {
                if let Some(current) = s.usage_period_start {
                    if *period_start <= current {
                        return Applied::Skipped("usage_period_already_reset");
                    }
                }
                s.used = 0;
                s.usage_period_start = Some(*period_start);
            }
            BillingChange::SetAccessStatus {
                subscription_id,
                status,
            } => {
                if self.is_stale(as_of) {
                    return Applied::Skipped("stale_status_event");
                }
                let s = &mut self.summary;
                if let Some(current) = s.stripe_subscription_id.as_deref() {
                    if current != subscription_id {
                        return Applied::Skipped("not_current_subscription");
                    }
                }
                s.status = *status;
                s.subscription_synced_at = Some(as_of);
            }
            BillingChange::UpsertSubscription(_)
            | BillingChange::UpsertInvoice(_)
            | BillingChange::UpsertPaymentMethod(_)
            | BillingChange::DetachPaymentMethod { .. }
            | BillingChange::SetDefaultPaymentMethod { .. }
            | BillingChange::UpsertCheckoutSession(_) => return Applied::Unchanged,
        }

        if self.summary == before {
            Applied::Unchanged
        } else {
            Applied::Changed
        }
    }

    /// Applies every summary change of a set, in order.
    pub fn apply_all(&mut self, set: &ChangeSet) -> CommitOutcome {
        let status_before = self.summary.status;
        let mut outcome = CommitOutcome::default();

        for change in &set.changes {
            match self.apply(change, set.as_of) {
                Applied::Changed => outcome.summary_changed = true,
                Applied::Unchanged => {}
                Applied::Skipped(reason) => outcome.skipped.push(reason),
            }
        }

        if self.summary.status != status_before {
            outcome.transition = Some((status_before, self.summary.status));
        }
        outcome
    }

    /// Builds the document the front-end reads.
    pub fn document(&self, updated_at: DateTime<Utc>) -> UserDocument {
        let s = &self.summary;
        UserDocument {
            subscription: SubscriptionDoc {
                status: s.status,
                plan: s.plan,
                quota: s.quota,
                used: s.used,
            },
            stripe_customer_id: s.stripe_customer_id.clone(),
            stripe_subscription_id: s.stripe_subscription_id.clone(),
            current_period_end: s.current_period_end,
            cancel_at_period_end: s.cancel_at_period_end,
            subscription_updated_at: Some(updated_at),
        }
    }
}

/// `users/{uid}` document fields owned by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    pub subscription: SubscriptionDoc,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub subscription_updated_at: Option<DateTime<Utc>>,
}

/// Nested `subscription` map of the user document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDoc {
    pub status: AccessStatus,
    pub plan: Option<PlanTier>,
    pub quota: i32,
    pub used: i32,
}

impl UserDocument {
    /// Compares everything except the write timestamp.
    pub fn same_state(&self, other: &UserDocument) -> bool {
        self.subscription == other.subscription
            && self.stripe_customer_id == other.stripe_customer_id
            && self.stripe_subscription_id == other.stripe_subscription_id
            && self.current_period_end.map(|t| t.timestamp())
                == other.current_period_end.map(|t| t.timestamp())
            && self.cancel_at_period_end == other.cancel_at_period_end
    }
}
