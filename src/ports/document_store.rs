//! DocumentStore port - The read-optimized `users/{uid}` documents.
//!
//! Only the relay and the reconciler write here; the document is a projection
//! of the relational summary and never the other way round.

use async_trait::async_trait;

use crate::domain::billing::UserDocument;
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merge-writes the synchronizer's fields, leaving other fields untouched.
    async fn merge_user(&self, user_id: &UserId, document: &UserDocument)
        -> Result<(), DomainError>;

    /// Reads the synchronizer's fields. `None` if the document does not exist.
    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, DomainError>;
}
