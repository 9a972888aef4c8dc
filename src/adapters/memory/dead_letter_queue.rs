//! In-memory dead-letter queue.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DeadLetterId, DomainError};
use crate::ports::{DeadLetter, DeadLetterQueue};

#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    letters: RwLock<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every letter ever pushed, resolved or not.
    pub async fn all(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn push(&self, letter: DeadLetter) -> Result<DeadLetterId, DomainError> {
        let mut letters = self.letters.write().await;
        if let Some(open) = letters
            .iter()
            .find(|l| l.is_open() && l.event_id == letter.event_id)
        {
            return Ok(open.id);
        }
        let id = letter.id;
        letters.push(letter);
        Ok(id)
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<DeadLetter>, DomainError> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .letters
            .read()
            .await
            .iter()
            .filter(|l| l.is_open())
            .take(take)
            .cloned()
            .collect())
    }

    async fn get(&self, id: DeadLetterId) -> Result<Option<DeadLetter>, DomainError> {
        Ok(self.letters.read().await.iter().find(|l| l.id == id).cloned())
    }

    async fn resolve(&self, id: DeadLetterId, resolution: &str) -> Result<bool, DomainError> {
        let mut letters = self.letters.write().await;
        match letters.iter_mut().find(|l| l.id == id && l.is_open()) {
            Some(letter) => {
                letter.resolved_at = Some(Utc::now());
                letter.resolution = Some(resolution.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
