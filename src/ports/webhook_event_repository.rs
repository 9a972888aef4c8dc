//! Idempotency ledger for Stripe events.
//!
//! Stripe delivers at least once. An event id lands here only once its
//! outcome is final, so a redelivery of a recorded id is acknowledged without
//! touching any state. Retryable failures leave no row behind and the next
//! delivery runs the handler again.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::{DeadLetterId, DomainError};

/// Stored outcome of a handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerResult {
    Success,
    Ignored,
    DeadLettered,
}

const LEDGER_LABELS: [(LedgerResult, &str); 3] = [
    (LedgerResult::Success, "success"),
    (LedgerResult::Ignored, "ignored"),
    (LedgerResult::DeadLettered, "dead_lettered"),
];

impl LedgerResult {
    /// Value of the `result` column.
    pub fn as_str(&self) -> &'static str {
        LEDGER_LABELS
            .iter()
            .find(|(result, _)| result == self)
            .map_or("success", |(_, label)| *label)
    }

    pub fn parse(label: &str) -> Option<Self> {
        LEDGER_LABELS
            .iter()
            .find(|(_, candidate)| *candidate == label)
            .map(|(result, _)| *result)
    }
}

impl fmt::Display for LedgerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the ledger.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
    pub result: LedgerResult,
    /// Why the event was ignored or parked. `None` on success.
    pub message: Option<String>,
    /// Verified event body, kept for audits.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn success(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
            result: LedgerResult::Success,
            message: None,
            payload,
        }
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::success(event_id, event_type, payload).with_outcome(LedgerResult::Ignored, reason)
    }

    pub fn dead_lettered(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::success(event_id, event_type, payload)
            .with_outcome(LedgerResult::DeadLettered, reason)
    }

    fn with_outcome(mut self, result: LedgerResult, message: impl Into<String>) -> Self {
        self.result = result;
        self.message = Some(message.into());
        self
    }
}

/// Whether `save` created the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    Inserted,
    /// Another delivery recorded the same event id first.
    AlreadyExists,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Inserts unless the event id is present. Must be atomic with respect to
    /// concurrent deliveries of the same id.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Rewrites the outcome of an existing row, used when a parked event is
    /// replayed successfully.
    async fn update_result(
        &self,
        event_id: &str,
        result: LedgerResult,
        message: Option<String>,
    ) -> Result<(), DomainError>;

    /// Prunes rows processed before `timestamp`. Returns how many went.
    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError>;
}

/// What the processor reports back to the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    Processed,
    Ignored,
    AlreadyProcessed,
    DeadLettered(DeadLetterId),
}

impl WebhookResult {
    /// Label returned in the webhook response body.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Ignored => "ignored",
            Self::AlreadyProcessed => "already_processed",
            Self::DeadLettered(_) => "dead_lettered",
        }
    }
}
