//! ListDeadLettersHandler - Query for open dead letters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeadLetterError;
use crate::ports::{DeadLetter, DeadLetterQueue};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// Query for open dead letters, oldest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDeadLettersQuery {
    pub limit: Option<i64>,
}

/// A dead letter as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterView {
    pub id: String,
    pub event_id: String,
    pub event_type: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl From<DeadLetter> for DeadLetterView {
    fn from(letter: DeadLetter) -> Self {
        Self {
            id: letter.id.to_string(),
            event_id: letter.event_id,
            event_type: letter.event_type,
            reason: letter.reason,
            created_at: letter.created_at,
            payload: letter.payload,
        }
    }
}

pub struct ListDeadLettersHandler {
    dead_letters: Arc<dyn DeadLetterQueue>,
}

impl ListDeadLettersHandler {
    pub fn new(dead_letters: Arc<dyn DeadLetterQueue>) -> Self {
        Self { dead_letters }
    }

    pub async fn handle(
        &self,
        query: ListDeadLettersQuery,
    ) -> Result<Vec<DeadLetterView>, DeadLetterError> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(DeadLetterError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }

        let letters = self.dead_letters.list_open(limit).await?;
        Ok(letters.into_iter().map(DeadLetterView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryDeadLetterQueue;
    use crate::domain::billing::StripeEventBuilder;

    async fn queue_with(count: usize) -> Arc<InMemoryDeadLetterQueue> {
        let queue = Arc::new(InMemoryDeadLetterQueue::new());
        for i in 0..count {
            let event = StripeEventBuilder::new().id(format!("evt_{}", i)).build();
            queue
                .push(DeadLetter::new(&event, "no user matches").unwrap())
                .await
                .unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn lists_open_letters() {
        let queue = queue_with(2).await;

        let views = ListDeadLettersHandler::new(queue)
            .handle(ListDeadLettersQuery::default())
            .await
            .unwrap();

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].reason, "no user matches");
    }

    #[tokio::test]
    async fn limit_is_applied() {
        let queue = queue_with(3).await;

        let views = ListDeadLettersHandler::new(queue)
            .handle(ListDeadLettersQuery { limit: Some(1) })
            .await
            .unwrap();

        assert_eq!(views.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected() {
        let queue = queue_with(0).await;

        let result = ListDeadLettersHandler::new(queue)
            .handle(ListDeadLettersQuery { limit: Some(0) })
            .await;

        assert!(matches!(result, Err(DeadLetterError::InvalidRequest(_))));
    }
}
