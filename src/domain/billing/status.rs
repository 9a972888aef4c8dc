//! Subscription status vocabulary.
//!
//! `SubscriptionStatus` is Stripe's own status string; `AccessStatus` is the
//! coarser value the front-end reads from the user summary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, ValidationError};

/// Stripe subscription status, as sent on subscription objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
    /// Status string this build does not know about.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Stripe's wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Unknown => "unknown",
        }
    }

    /// Parses Stripe's wire representation. Unrecognized strings map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "unpaid" => SubscriptionStatus::Unpaid,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Unknown,
        }
    }

    /// Maps the provider status onto the access status users see.
    pub fn access_status(&self) -> AccessStatus {
        match self {
            SubscriptionStatus::Trialing => AccessStatus::Trial,
            SubscriptionStatus::Active => AccessStatus::Active,
            SubscriptionStatus::PastDue | SubscriptionStatus::Unpaid => AccessStatus::PastDue,
            SubscriptionStatus::Incomplete
            | SubscriptionStatus::IncompleteExpired
            | SubscriptionStatus::Canceled
            | SubscriptionStatus::Paused
            | SubscriptionStatus::Unknown => AccessStatus::Inactive,
        }
    }

    /// Returns true if the subscription still carries a paid entitlement.
    pub fn grants_quota(&self) -> bool {
        matches!(
            self.access_status(),
            AccessStatus::Trial | AccessStatus::Active | AccessStatus::PastDue
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access status stored on the user summary and mirrored to the user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Trial period; the default for freshly signed-up users.
    Trial,
    Active,
    /// Latest invoice failed. Access is kept while Stripe retries.
    PastDue,
    Inactive,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Trial => "trial",
            AccessStatus::Active => "active",
            AccessStatus::PastDue => "past_due",
            AccessStatus::Inactive => "inactive",
        }
    }
}

impl Default for AccessStatus {
    fn default() -> Self {
        AccessStatus::Trial
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(AccessStatus::Trial),
            "active" => Ok(AccessStatus::Active),
            "past_due" => Ok(AccessStatus::PastDue),
            "inactive" => Ok(AccessStatus::Inactive),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown access status '{}'", other),
            )),
        }
    }
}

impl StateMachine for AccessStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use AccessStatus::*;
        matches!(
            (self, target),
            (Trial, Active)
                | (Trial, Inactive)
                | (Active, PastDue)
                | (Active, Inactive)
                | (Active, Active) // Renewal
                | (PastDue, Active)
                | (PastDue, PastDue) // Another failed retry
                | (PastDue, Inactive)
                // Resubscribe
                | (Inactive, Trial)
                | (Inactive, Active)
                | (Inactive, Inactive)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use AccessStatus::*;
        match self {
            Trial => vec![Active, Inactive],
            Active => vec![PastDue, Inactive, Active],
            PastDue => vec![Active, PastDue, Inactive],
            Inactive => vec![Trial, Active, Inactive],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_map_to_access_statuses() {
        assert_eq!(SubscriptionStatus::Trialing.access_status(), AccessStatus::Trial);
        assert_eq!(SubscriptionStatus::Active.access_status(), AccessStatus::Active);
        assert_eq!(SubscriptionStatus::PastDue.access_status(), AccessStatus::PastDue);
        assert_eq!(SubscriptionStatus::Unpaid.access_status(), AccessStatus::PastDue);
        assert_eq!(SubscriptionStatus::Canceled.access_status(), AccessStatus::Inactive);
        assert_eq!(
            SubscriptionStatus::IncompleteExpired.access_status(),
            AccessStatus::Inactive
        );
    }

    #[test]
    fn unknown_provider_status_deserializes_to_unknown() {
        let status: SubscriptionStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(status, SubscriptionStatus::Unknown);
        assert!(!status.grants_quota());
    }

    #[test]
    fn provider_status_deserializes_snake_case() {
        let status: SubscriptionStatus = serde_json::from_str("\"past_due\"").unwrap();
        assert_eq!(status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn access_status_parses_its_own_display() {
        for status in [
            AccessStatus::Trial,
            AccessStatus::Active,
            AccessStatus::PastDue,
            AccessStatus::Inactive,
        ] {
            assert_eq!(status.to_string().parse::<AccessStatus>().unwrap(), status);
        }
    }

    #[test]
    fn access_status_rejects_unknown_string() {
        assert!("canceled".parse::<AccessStatus>().is_err());
    }

    #[test]
    fn new_users_start_in_trial() {
        assert_eq!(AccessStatus::default(), AccessStatus::Trial);
    }

    // Unit Tests - State Transitions

    #[test]
    fn lifecycle_transitions_are_expected() {
        assert!(AccessStatus::Trial.can_transition_to(&AccessStatus::Active));
        assert!(AccessStatus::Active.can_transition_to(&AccessStatus::PastDue));
        assert!(AccessStatus::PastDue.can_transition_to(&AccessStatus::Active));
        assert!(AccessStatus::PastDue.can_transition_to(&AccessStatus::Inactive));
        assert!(AccessStatus::Active.can_transition_to(&AccessStatus::Inactive));
    }

    #[test]
    fn trial_to_past_due_is_unexpected() {
        assert!(!AccessStatus::Trial.can_transition_to(&AccessStatus::PastDue));
        assert!(AccessStatus::Trial
            .transition_to(AccessStatus::PastDue)
            .is_err());
    }

    #[test]
    fn valid_transitions_agree_with_can_transition_to() {
        for from in [
            AccessStatus::Trial,
            AccessStatus::Active,
            AccessStatus::PastDue,
            AccessStatus::Inactive,
        ] {
            for to in from.valid_transitions() {
                assert!(from.can_transition_to(&to), "{:?} -> {:?}", from, to);
            }
        }
    }
}
