//! In-memory webhook ledger.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::{LedgerResult, SaveResult, WebhookEventRecord, WebhookEventRepository};

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.get(event_id).cloned())
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        match self.records.write().await.entry(record.event_id.clone()) {
            Entry::Occupied(_) => Ok(SaveResult::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(SaveResult::Inserted)
            }
        }
    }

    async fn update_result(
        &self,
        event_id: &str,
        result: LedgerResult,
        message: Option<String>,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(event_id) {
            *record = WebhookEventRecord {
                result,
                message,
                processed_at: Utc::now(),
                ..record.clone()
            };
        }
        Ok(())
    }

    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let expired: Vec<String> = records
            .values()
            .filter(|r| r.processed_at < timestamp)
            .map(|r| r.event_id.clone())
            .collect();
        for event_id in &expired {
            records.remove(event_id);
        }
        Ok(expired.len() as u64)
    }
}
