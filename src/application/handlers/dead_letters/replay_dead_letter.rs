//! ReplayDeadLetterHandler - Re-runs a parked event after the data was fixed.
//!
//! The stored event was verified when it first arrived, so it goes straight
//! to the dispatcher. Success resolves the letter; another failure leaves it
//! open with the new error returned to the operator.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::DeadLetterError;
use crate::domain::billing::IdempotentWebhookProcessor;
use crate::domain::foundation::DeadLetterId;
use crate::ports::DeadLetterQueue;

#[derive(Debug, Clone)]
pub struct ReplayDeadLetterCommand {
    pub id: DeadLetterId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayDeadLetterResult {
    pub id: String,
    pub event_id: String,
    /// `processed` or `ignored`.
    pub result: &'static str,
}

pub struct ReplayDeadLetterHandler {
    dead_letters: Arc<dyn DeadLetterQueue>,
    processor: Arc<IdempotentWebhookProcessor>,
}

impl ReplayDeadLetterHandler {
    pub fn new(
        dead_letters: Arc<dyn DeadLetterQueue>,
        processor: Arc<IdempotentWebhookProcessor>,
    ) -> Self {
        Self {
            dead_letters,
            processor,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReplayDeadLetterCommand,
    ) -> Result<ReplayDeadLetterResult, DeadLetterError> {
        let letter = self
            .dead_letters
            .get(cmd.id)
            .await?
            .ok_or(DeadLetterError::NotFound(cmd.id))?;
        if !letter.is_open() {
            return Err(DeadLetterError::AlreadyResolved(cmd.id));
        }

        let event = letter.event()?;
        let outcome = self
            .processor
            .replay(&event)
            .await
            .map_err(DeadLetterError::ReplayFailed)?;

        let resolution = format!("replayed: {}", outcome.as_str());
        if !self.dead_letters.resolve(cmd.id, &resolution).await? {
            // Resolved concurrently; the replay itself was idempotent
            return Err(DeadLetterError::AlreadyResolved(cmd.id));
        }

        info!(
            dead_letter_id = %cmd.id,
            event_id = %event.id,
            result = outcome.as_str(),
            "Dead letter replayed"
        );
        Ok(ReplayDeadLetterResult {
            id: cmd.id.to_string(),
            event_id: event.id,
            result: outcome.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBillingStore, InMemoryDeadLetterQueue, InMemoryStripeGateway,
        InMemoryWebhookEventRepository,
    };
    use crate::application::handlers::sync::BillingEventDispatcher;
    use crate::domain::billing::{AccessStatus, PlanCatalog, StripeEventBuilder, UserAccount};
    use crate::domain::foundation::UserId;
    use crate::ports::{LedgerResult, WebhookEventRepository, WebhookResult};
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryBillingStore>,
        ledger: Arc<InMemoryWebhookEventRepository>,
        dead_letters: Arc<InMemoryDeadLetterQueue>,
        processor: Arc<IdempotentWebhookProcessor>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        let ledger = Arc::new(InMemoryWebhookEventRepository::new());
        let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
        let dispatcher = BillingEventDispatcher::with_sync_handlers(
            store.clone(),
            Arc::new(InMemoryStripeGateway::new()),
            Arc::new(PlanCatalog::default()),
        );
        let processor = Arc::new(IdempotentWebhookProcessor::new(
            ledger.clone(),
            dead_letters.clone(),
            Arc::new(dispatcher),
        ));
        Fixture {
            store,
            ledger,
            dead_letters,
            processor,
        }
    }

    fn orphan_subscription() -> crate::domain::billing::StripeEvent {
        StripeEventBuilder::new()
            .id("evt_orphan")
            .event_type("customer.subscription.created")
            .object(json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "metadata": {"user_id": "uid-late"},
                "items": {"data": [{"id": "si_1", "price": {"id": "price_starter_monthly"}}]}
            }))
            .build()
    }

    async fn park(f: &Fixture) -> DeadLetterId {
        match f.processor.process(orphan_subscription()).await.unwrap() {
            WebhookResult::DeadLettered(id) => id,
            other => panic!("expected dead letter, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn replay_after_user_exists_applies_and_resolves() {
        let f = fixture();
        let id = park(&f).await;
        f.store
            .insert_user(UserAccount::new(UserId::new("uid-late").unwrap(), None))
            .await;

        let result = ReplayDeadLetterHandler::new(f.dead_letters.clone(), f.processor.clone())
            .handle(ReplayDeadLetterCommand { id })
            .await
            .unwrap();

        assert_eq!(result.result, "processed");
        assert_eq!(result.event_id, "evt_orphan");
        let user = f.store.user("uid-late").await.unwrap();
        assert_eq!(user.summary.status, AccessStatus::Active);
        assert_eq!(user.summary.quota, 3);
        assert!(!f.dead_letters.get(id).await.unwrap().unwrap().is_open());
        let record = f.ledger.find_by_event_id("evt_orphan").await.unwrap().unwrap();
        assert_eq!(record.result, LedgerResult::Success);
    }

    #[tokio::test]
    async fn failed_replay_keeps_letter_open() {
        let f = fixture();
        let id = park(&f).await;

        let err = ReplayDeadLetterHandler::new(f.dead_letters.clone(), f.processor.clone())
            .handle(ReplayDeadLetterCommand { id })
            .await
            .unwrap_err();

        assert!(matches!(err, DeadLetterError::ReplayFailed(_)));
        assert!(f.dead_letters.get(id).await.unwrap().unwrap().is_open());
    }

    #[tokio::test]
    async fn resolved_letter_cannot_be_replayed() {
        let f = fixture();
        let id = park(&f).await;
        f.dead_letters.resolve(id, "handled").await.unwrap();

        let err = ReplayDeadLetterHandler::new(f.dead_letters.clone(), f.processor.clone())
            .handle(ReplayDeadLetterCommand { id })
            .await
            .unwrap_err();

        assert!(matches!(err, DeadLetterError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn unknown_letter_is_not_found() {
        let f = fixture();

        let err = ReplayDeadLetterHandler::new(f.dead_letters.clone(), f.processor.clone())
            .handle(ReplayDeadLetterCommand {
                id: DeadLetterId::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DeadLetterError::NotFound(_)));
    }
}
