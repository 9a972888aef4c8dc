//! DeadLetterQueue port - Parking lot for authentic events that cannot be applied.
//!
//! An event lands here when it verified correctly but could not be attributed
//! to a user or priced. Operators fix the data and replay it, or resolve it
//! by hand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::StripeEvent;
use crate::domain::foundation::{DeadLetterId, DomainError};

/// A parked webhook event.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: DeadLetterId,
    pub event_id: String,
    pub event_type: String,
    pub reason: String,
    /// The full verified event, replayable as-is.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl DeadLetter {
    /// Parks an event with the reason it could not be applied.
    pub fn new(event: &StripeEvent, reason: impl Into<String>) -> Result<Self, DomainError> {
        let payload = serde_json::to_value(event).map_err(|e| {
            DomainError::validation("payload", format!("Failed to serialize event: {}", e))
        })?;
        Ok(Self {
            id: DeadLetterId::new(),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            reason: reason.into(),
            payload,
            created_at: Utc::now(),
            resolved_at: None,
            resolution: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Rebuilds the stored event for replay.
    pub fn event(&self) -> Result<StripeEvent, DomainError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            DomainError::validation("payload", format!("Stored event is unreadable: {}", e))
        })
    }
}

/// Port for the dead-letter queue.
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    /// Parks a letter and returns the id of the open letter for its event.
    ///
    /// At most one letter per event id is open at a time: when another
    /// delivery of the same event already parked one, that letter's id is
    /// returned and `letter` is dropped.
    async fn push(&self, letter: DeadLetter) -> Result<DeadLetterId, DomainError>;

    /// Open letters, oldest first.
    async fn list_open(&self, limit: i64) -> Result<Vec<DeadLetter>, DomainError>;

    async fn get(&self, id: DeadLetterId) -> Result<Option<DeadLetter>, DomainError>;

    /// Marks a letter resolved. Returns false if it was unknown or already resolved.
    async fn resolve(&self, id: DeadLetterId, resolution: &str) -> Result<bool, DomainError>;
}
