//! ResolveDeadLetterHandler - Closes a dead letter without replaying it.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::DeadLetterError;
use crate::domain::foundation::DeadLetterId;
use crate::ports::DeadLetterQueue;

#[derive(Debug, Clone)]
pub struct ResolveDeadLetterCommand {
    pub id: DeadLetterId,
    /// Operator note, e.g. "customer deleted in Stripe".
    pub resolution: String,
}

/// Request body for the resolve endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDeadLetterRequest {
    pub resolution: String,
}

pub struct ResolveDeadLetterHandler {
    dead_letters: Arc<dyn DeadLetterQueue>,
}

impl ResolveDeadLetterHandler {
    pub fn new(dead_letters: Arc<dyn DeadLetterQueue>) -> Self {
        Self { dead_letters }
    }

    pub async fn handle(&self, cmd: ResolveDeadLetterCommand) -> Result<(), DeadLetterError> {
        let resolution = cmd.resolution.trim();
        if resolution.is_empty() {
            return Err(DeadLetterError::InvalidRequest(
                "resolution note is required".to_string(),
            ));
        }

        if self.dead_letters.resolve(cmd.id, resolution).await? {
            info!(dead_letter_id = %cmd.id, %resolution, "Dead letter resolved by operator");
            return Ok(());
        }

        match self.dead_letters.get(cmd.id).await? {
            Some(_) => Err(DeadLetterError::AlreadyResolved(cmd.id)),
            None => Err(DeadLetterError::NotFound(cmd.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryDeadLetterQueue;
    use crate::domain::billing::StripeEventBuilder;
    use crate::ports::DeadLetter;

    async fn parked() -> (Arc<InMemoryDeadLetterQueue>, DeadLetterId) {
        let queue = Arc::new(InMemoryDeadLetterQueue::new());
        let letter = DeadLetter::new(&StripeEventBuilder::new().build(), "no match").unwrap();
        let id = letter.id;
        queue.push(letter).await.unwrap();
        (queue, id)
    }

    fn cmd(id: DeadLetterId, note: &str) -> ResolveDeadLetterCommand {
        ResolveDeadLetterCommand {
            id,
            resolution: note.to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_closes_open_letter() {
        let (queue, id) = parked().await;

        ResolveDeadLetterHandler::new(queue.clone())
            .handle(cmd(id, "test customer, ignore"))
            .await
            .unwrap();

        let letter = queue.get(id).await.unwrap().unwrap();
        assert_eq!(letter.resolution.as_deref(), Some("test customer, ignore"));
    }

    #[tokio::test]
    async fn second_resolve_reports_already_resolved() {
        let (queue, id) = parked().await;
        let handler = ResolveDeadLetterHandler::new(queue);
        handler.handle(cmd(id, "done")).await.unwrap();

        let err = handler.handle(cmd(id, "again")).await.unwrap_err();

        assert!(matches!(err, DeadLetterError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn blank_note_is_rejected() {
        let (queue, id) = parked().await;

        let err = ResolveDeadLetterHandler::new(queue)
            .handle(cmd(id, "   "))
            .await
            .unwrap_err();

        assert!(matches!(err, DeadLetterError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unknown_letter_is_not_found() {
        let (queue, _) = parked().await;

        let err = ResolveDeadLetterHandler::new(queue)
            .handle(cmd(DeadLetterId::new(), "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, DeadLetterError::NotFound(_)));
    }
}
