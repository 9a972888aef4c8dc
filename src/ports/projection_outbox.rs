//! ProjectionOutbox port - Pending document projections.
//!
//! Implements the Transactional Outbox Pattern for the user document:
//!
//! 1. `BillingStore::commit` writes the summary AND an outbox entry in one transaction
//! 2. The projection relay reads pending entries
//! 3. The relay re-reads the user summary, merges the document and marks the entry
//!
//! Entries only name the user. The relay always projects the *current* row,
//! so entries processed out of order still converge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, UserId};

/// Status of an outbox entry in the projection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStatus {
    /// Written but not yet projected
    Pending,
    /// Document written
    Published,
    /// Document write failed; retried once `next_attempt_at` passes
    Failed,
}

impl ProjectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionStatus::Pending => "pending",
            ProjectionStatus::Published => "published",
            ProjectionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProjectionStatus::Pending),
            "published" => Some(ProjectionStatus::Published),
            "failed" => Some(ProjectionStatus::Failed),
            _ => None,
        }
    }
}

/// An entry in the projection outbox table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionEntry {
    pub id: Uuid,

    /// User whose document must be rewritten
    pub user_id: UserId,

    /// Stripe event that caused the change, or a reconcile marker
    pub source: String,

    pub status: ProjectionStatus,

    pub created_at: DateTime<Utc>,

    /// When the entry was last processed (published or failed)
    pub processed_at: Option<DateTime<Utc>>,

    pub attempts: i32,

    pub last_error: Option<String>,

    /// Earliest time the relay picks the entry up again.
    pub next_attempt_at: DateTime<Utc>,
}

impl ProjectionEntry {
    /// Create a new pending entry.
    pub fn new(user_id: UserId, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            source: source.into(),
            status: ProjectionStatus::Pending,
            created_at: now,
            processed_at: None,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
        }
    }

    /// Whether the relay should pick this entry up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status != ProjectionStatus::Published && self.next_attempt_at <= now
    }

    pub fn mark_published(&mut self) {
        self.status = ProjectionStatus::Published;
        self.processed_at = Some(Utc::now());
        self.attempts += 1;
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, retry_at: DateTime<Utc>) {
        self.status = ProjectionStatus::Failed;
        self.processed_at = Some(Utc::now());
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.next_attempt_at = retry_at;
    }
}

/// Port for reading and settling projection outbox entries.
#[async_trait]
pub trait ProjectionOutbox: Send + Sync {
    /// Enqueue outside a commit (reconciliation, manual repair).
    async fn enqueue(&self, user_id: &UserId, source: &str) -> Result<ProjectionEntry, DomainError>;

    /// Unpublished entries due at `now`, oldest first. No entry is ever
    /// dropped for failing too often.
    async fn get_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProjectionEntry>, DomainError>;

    async fn mark_published(&self, id: Uuid) -> Result<(), DomainError>;

    /// Records the failure and defers the entry until `retry_at`.
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Delete published entries older than the cutoff. Returns the number deleted.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError>;
}
