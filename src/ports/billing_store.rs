//! BillingStore port - The relational source of truth for billing state.
//!
//! `commit` is the only write path. Implementations apply a whole change set
//! in one transaction: billing rows, the guarded user summary and, when the
//! summary changed, a document projection entry.

use async_trait::async_trait;

use crate::domain::billing::{ChangeSet, CommitOutcome, UserAccount};
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<UserAccount>, DomainError>;

    /// Case-insensitive lookup by email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, DomainError>;

    /// Looks up the customer id to user id mapping.
    async fn find_user_by_customer(&self, customer_id: &str)
        -> Result<Option<UserId>, DomainError>;

    /// Applies a change set atomically.
    ///
    /// Fails with `UserNotFound` if the user row does not exist.
    async fn commit(&self, changes: &ChangeSet) -> Result<CommitOutcome, DomainError>;

    /// Pages through users ordered by id (keyset pagination).
    async fn list_users(
        &self,
        after: Option<&UserId>,
        limit: i64,
    ) -> Result<Vec<UserAccount>, DomainError>;
}
