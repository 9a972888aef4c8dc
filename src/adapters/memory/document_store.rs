//! In-memory user document store with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::UserDocument;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::DocumentStore;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, UserDocument>>,
    failures_remaining: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` writes fail with a document store error.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn document(&self, user_id: &str) -> Option<UserDocument> {
        self.documents.read().await.get(user_id).cloned()
    }

    /// Seeds a document, bypassing failure injection.
    pub async fn put(&self, user_id: &str, document: UserDocument) {
        self.documents
            .write()
            .await
            .insert(user_id.to_string(), document);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn merge_user(
        &self,
        user_id: &UserId,
        document: &UserDocument,
    ) -> Result<(), DomainError> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DomainError::document_store("Injected document write failure"));
        }

        self.documents
            .write()
            .await
            .insert(user_id.as_str().to_string(), document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, DomainError> {
        Ok(self.documents.read().await.get(user_id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::UserAccount;
    use chrono::Utc;

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryDocumentStore::new();
        let uid = UserId::new("uid-1").unwrap();
        let doc = UserAccount::new(uid.clone(), None).document(Utc::now());
        store.fail_next_writes(1);

        assert!(store.merge_user(&uid, &doc).await.is_err());
        assert!(store.merge_user(&uid, &doc).await.is_ok());
        assert_eq!(store.write_count(), 1);
        assert!(store.get_user(&uid).await.unwrap().is_some());
    }
}
