//! Identity resolution vocabulary.
//!
//! Stripe objects do not always carry our user id, so each handler extracts
//! `IdentityHints` and the resolver walks them in a fixed order.

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::foundation::UserId;

/// Metadata keys that may carry the internal user id.
pub const USER_ID_METADATA_KEYS: [&str; 3] = ["user_id", "userId", "firebaseUid"];

/// Everything an event offers for working out which user it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHints {
    /// User id from object metadata or a checkout `client_reference_id`.
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub email: Option<String>,
}

impl IdentityHints {
    /// Starts from a metadata map, picking the first user id key present.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Self {
        let user_id = USER_ID_METADATA_KEYS
            .iter()
            .filter_map(|key| metadata.get(*key))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string);
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn with_user_id(mut self, user_id: Option<&str>) -> Self {
        if self.user_id.is_none() {
            self.user_id = non_blank(user_id);
        }
        self
    }

    pub fn with_customer(mut self, customer_id: Option<&str>) -> Self {
        self.customer_id = non_blank(customer_id);
        self
    }

    pub fn with_email(mut self, email: Option<&str>) -> Self {
        self.email = non_blank(email).map(|e| e.to_lowercase());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.customer_id.is_none() && self.email.is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Which rung of the ladder produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Metadata,
    CustomerMapping,
    Email,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedBy::Metadata => "metadata",
            ResolvedBy::CustomerMapping => "customer_mapping",
            ResolvedBy::Email => "email",
        }
    }
}

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub resolved_by: ResolvedBy,
    /// Customer id the event referred to, if any.
    pub customer_id: Option<String>,
    /// Email the event (or the Stripe customer) carried, if any.
    pub email: Option<String>,
}

impl ResolvedIdentity {
    /// True when the customer id should be linked to the user in this commit.
    pub fn needs_customer_link(&self) -> bool {
        self.customer_id.is_some() && self.resolved_by != ResolvedBy::CustomerMapping
    }
}

/// Resolution failed; the event goes to the dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("event carries no user id, customer id or email")]
    NoHints,

    #[error("no user matches customer {customer_id:?} or email {email:?}")]
    NoMatch {
        customer_id: Option<String>,
        email: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn metadata_user_id_is_preferred_key() {
        let hints = IdentityHints::from_metadata(&metadata(&[
            ("firebaseUid", "uid-b"),
            ("user_id", "uid-a"),
        ]));
        assert_eq!(hints.user_id.as_deref(), Some("uid-a"));
    }

    #[test]
    fn camel_case_metadata_keys_are_accepted() {
        let hints = IdentityHints::from_metadata(&metadata(&[("userId", "uid-c")]));
        assert_eq!(hints.user_id.as_deref(), Some("uid-c"));
    }

    #[test]
    fn blank_metadata_values_are_skipped() {
        let hints = IdentityHints::from_metadata(&metadata(&[("user_id", "  "), ("userId", "uid-d")]));
        assert_eq!(hints.user_id.as_deref(), Some("uid-d"));
    }

    #[test]
    fn client_reference_id_only_fills_missing_user_id() {
        let hints = IdentityHints::from_metadata(&metadata(&[("user_id", "uid-a")]))
            .with_user_id(Some("uid-ref"));
        assert_eq!(hints.user_id.as_deref(), Some("uid-a"));

        let hints = IdentityHints::default().with_user_id(Some("uid-ref"));
        assert_eq!(hints.user_id.as_deref(), Some("uid-ref"));
    }

    #[test]
    fn email_is_normalized() {
        let hints = IdentityHints::default().with_email(Some(" Pat@Example.COM "));
        assert_eq!(hints.email.as_deref(), Some("pat@example.com"));
    }

    #[test]
    fn empty_hints_are_detected() {
        assert!(IdentityHints::default().with_customer(Some("")).is_empty());
        assert!(!IdentityHints::default().with_customer(Some("cus_1")).is_empty());
    }

    #[test]
    fn customer_link_needed_unless_resolved_by_mapping() {
        let mut resolved = ResolvedIdentity {
            user_id: UserId::new("uid-1").unwrap(),
            resolved_by: ResolvedBy::Email,
            customer_id: Some("cus_1".to_string()),
            email: None,
        };
        assert!(resolved.needs_customer_link());

        resolved.resolved_by = ResolvedBy::CustomerMapping;
        assert!(!resolved.needs_customer_link());

        resolved.resolved_by = ResolvedBy::Metadata;
        resolved.customer_id = None;
        assert!(!resolved.needs_customer_link());
    }
}
