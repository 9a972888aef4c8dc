//! Failure taxonomy for a single webhook delivery.
//!
//! Every variant falls in exactly one bucket: rejected (4xx, Stripe stops),
//! parked or ignored (200, acknowledged) or transient (500, Stripe retries).

use axum::http::StatusCode;
use thiserror::Error;

use super::identity::ResolutionError;
use super::plan::PlanError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signature timestamp too far in the future.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// `livemode: false` while only live events are accepted.
    #[error("Test-mode event rejected")]
    TestModeRejected,

    /// No user matches the event's customer, metadata or email.
    #[error("Unresolved identity: {0}")]
    Unresolved(#[from] ResolutionError),

    /// Price id missing from the plan catalog.
    #[error("Plan resolution failed: {0}")]
    Plan(#[from] PlanError),

    /// Nothing to do for this event.
    #[error("Event ignored: {0}")]
    Ignored(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Document store error: {0}")]
    DocumentStore(String),

    /// Stripe API call failed.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl WebhookError {
    /// Transient failures; the delivery is answered with a 5xx.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_) | WebhookError::DocumentStore(_) | WebhookError::Provider(_)
        )
    }

    /// Authentic events that a redelivery cannot fix. They go to the
    /// dead-letter queue and are acknowledged.
    pub fn is_dead_letter(&self) -> bool {
        matches!(
            self,
            WebhookError::Unresolved(_)
                | WebhookError::Plan(_)
                | WebhookError::MissingField(_)
                | WebhookError::ParseError(_)
        )
    }

    /// Response status. Stripe retries only on 5xx.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_)
            | WebhookError::TestModeRejected => StatusCode::BAD_REQUEST,

            WebhookError::Unresolved(_) | WebhookError::Plan(_) | WebhookError::Ignored(_) => {
                StatusCode::OK
            }

            WebhookError::Database(_)
            | WebhookError::DocumentStore(_)
            | WebhookError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::domain::foundation::DomainError> for WebhookError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        use crate::domain::foundation::ErrorCode;
        match err.code {
            ErrorCode::DocumentStoreError => WebhookError::DocumentStore(err.message),
            ErrorCode::ExternalServiceError => WebhookError::Provider(err.message),
            _ => WebhookError::Database(err.to_string()),
        }
    }
}
