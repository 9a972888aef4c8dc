//! Webhook processor - Orchestrates idempotent webhook event handling.
//!
//! ## Design
//!
//! The processor follows these steps:
//! 1. Check if event was already handled (idempotency ledger)
//! 2. Dispatch to the handler registered for the event type
//! 3. Record final outcomes (success, ignored, dead-lettered)
//!
//! Retryable failures are returned without a ledger record so that Stripe's
//! redelivery runs the handler again.
//!
//! ## Race Condition Handling
//!
//! When multiple webhook deliveries arrive simultaneously both may run the
//! handler. Handlers are idempotent (upserts and guarded summary updates), so
//! the state converges; the first ledger insert wins and the other reports
//! `AlreadyProcessed`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::stripe_event::{StripeEvent, StripeEventType};
use super::webhook_errors::WebhookError;
use crate::ports::{
    DeadLetter, DeadLetterQueue, LedgerResult, SaveResult, WebhookEventRecord,
    WebhookEventRepository, WebhookResult,
};

/// Handler for a specific type of Stripe webhook event.
///
/// Implementations focus on one family of events and receive the parsed,
/// verified event.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    /// Returns the event type(s) this handler processes.
    fn handles(&self) -> Vec<StripeEventType>;

    /// Handles the webhook event.
    ///
    /// Returns `Err(WebhookError::Ignored(_))` if the event should be
    /// acknowledged but not processed.
    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError>;
}

/// Dispatches webhook events to the appropriate handler.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    /// Find a handler for the given event type.
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler>;

    /// Dispatch an event to its handler.
    ///
    /// Returns `Err(WebhookError::Ignored)` if no handler is registered.
    async fn dispatch(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let event_type = event.parsed_type();
        match self.get_handler(&event_type) {
            Some(handler) => handler.handle(event).await,
            None => Err(WebhookError::Ignored(format!(
                "No handler for event type: {}",
                event.event_type
            ))),
        }
    }
}

/// Processes webhook events with idempotency guarantees.
pub struct IdempotentWebhookProcessor {
    ledger: Arc<dyn WebhookEventRepository>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl IdempotentWebhookProcessor {
    pub fn new(
        ledger: Arc<dyn WebhookEventRepository>,
        dead_letters: Arc<dyn DeadLetterQueue>,
        dispatcher: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        Self {
            ledger,
            dead_letters,
            dispatcher,
        }
    }

    /// Process a verified webhook event at most once.
    ///
    /// # Returns
    ///
    /// - `Ok(Processed | Ignored)` - final outcome, recorded in the ledger
    /// - `Ok(AlreadyProcessed)` - duplicate delivery, nothing ran
    /// - `Ok(DeadLettered(id))` - parked for manual reconciliation
    /// - `Err(_)` - retryable failure, nothing recorded
    pub async fn process(&self, event: StripeEvent) -> Result<WebhookResult, WebhookError> {
        if self.ledger.find_by_event_id(&event.id).await?.is_some() {
            info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook delivery");
            return Ok(WebhookResult::AlreadyProcessed);
        }

        let payload = serde_json::to_value(&event)
            .map_err(|e| WebhookError::ParseError(format!("Failed to serialize event: {}", e)))?;

        let (record, outcome) = match self.dispatcher.dispatch(&event).await {
            Ok(()) => (
                WebhookEventRecord::success(&event.id, &event.event_type, payload),
                WebhookResult::Processed,
            ),
            Err(WebhookError::Ignored(reason)) => {
                info!(event_id = %event.id, event_type = %event.event_type, %reason, "Webhook ignored");
                (
                    WebhookEventRecord::ignored(&event.id, &event.event_type, reason, payload),
                    WebhookResult::Ignored,
                )
            }
            Err(e) if e.is_dead_letter() => {
                let id = self.park(&event, &e).await?;
                (
                    WebhookEventRecord::dead_lettered(
                        &event.id,
                        &event.event_type,
                        e.to_string(),
                        payload,
                    ),
                    WebhookResult::DeadLettered(id),
                )
            }
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Webhook processing failed"
                );
                return Err(e);
            }
        };

        match self.ledger.save(record).await? {
            SaveResult::Inserted => Ok(outcome),
            SaveResult::AlreadyExists => Ok(WebhookResult::AlreadyProcessed),
        }
    }

    /// Re-runs a dead-lettered event, bypassing the ledger check.
    ///
    /// On success the ledger entry is flipped to `success`. A failure that
    /// would dead-letter again is returned as an error so the letter stays open.
    pub async fn replay(&self, event: &StripeEvent) -> Result<WebhookResult, WebhookError> {
        let (result, outcome, message) = match self.dispatcher.dispatch(event).await {
            Ok(()) => (LedgerResult::Success, WebhookResult::Processed, None),
            Err(WebhookError::Ignored(reason)) => {
                (LedgerResult::Ignored, WebhookResult::Ignored, Some(reason))
            }
            Err(e) => return Err(e),
        };

        let payload = serde_json::to_value(event)
            .map_err(|e| WebhookError::ParseError(format!("Failed to serialize event: {}", e)))?;
        let record = WebhookEventRecord {
            result,
            message: message.clone(),
            ..WebhookEventRecord::success(&event.id, &event.event_type, payload)
        };
        if self.ledger.save(record).await? == SaveResult::AlreadyExists {
            self.ledger.update_result(&event.id, result, message).await?;
        }

        info!(event_id = %event.id, event_type = %event.event_type, "Dead-lettered webhook replayed");
        Ok(outcome)
    }

    async fn park(
        &self,
        event: &StripeEvent,
        error: &WebhookError,
    ) -> Result<crate::domain::foundation::DeadLetterId, WebhookError> {
        let letter = DeadLetter::new(event, error.to_string())?;
        let id = self.dead_letters.push(letter).await?;
        warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            dead_letter_id = %id,
            reason = %error,
            "Webhook dead-lettered"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{PlanError, ResolutionError, StripeEventBuilder};
    use crate::domain::foundation::{DeadLetterId, DomainError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    // ══════════════════════════════════════════════════════════════
    // Test Infrastructure
    // ══════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct MockLedger {
        records: RwLock<HashMap<String, WebhookEventRecord>>,
    }

    #[async_trait]
    impl WebhookEventRepository for MockLedger {
        async fn find_by_event_id(
            &self,
            event_id: &str,
        ) -> Result<Option<WebhookEventRecord>, DomainError> {
            Ok(self.records.read().await.get(event_id).cloned())
        }

        async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
            let mut records = self.records.write().await;
            if records.contains_key(&record.event_id) {
                Ok(SaveResult::AlreadyExists)
            } else {
                records.insert(record.event_id.clone(), record);
                Ok(SaveResult::Inserted)
            }
        }

        async fn update_result(
            &self,
            event_id: &str,
            result: LedgerResult,
            message: Option<String>,
        ) -> Result<(), DomainError> {
            if let Some(record) = self.records.write().await.get_mut(event_id) {
                record.result = result;
                record.message = message;
            }
            Ok(())
        }

        async fn delete_before(
            &self,
            _timestamp: chrono::DateTime<chrono::Utc>,
        ) -> Result<u64, DomainError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct MockDeadLetters {
        letters: RwLock<Vec<DeadLetter>>,
    }

    #[async_trait]
    impl DeadLetterQueue for MockDeadLetters {
        async fn push(&self, letter: DeadLetter) -> Result<DeadLetterId, DomainError> {
            let mut letters = self.letters.write().await;
            if let Some(open) = letters.iter().find(|l| l.event_id == letter.event_id) {
                return Ok(open.id);
            }
            let id = letter.id;
            letters.push(letter);
            Ok(id)
        }

        async fn list_open(&self, _limit: i64) -> Result<Vec<DeadLetter>, DomainError> {
            Ok(self.letters.read().await.clone())
        }

        async fn get(&self, id: DeadLetterId) -> Result<Option<DeadLetter>, DomainError> {
            Ok(self.letters.read().await.iter().find(|l| l.id == id).cloned())
        }

        async fn resolve(&self, _id: DeadLetterId, _resolution: &str) -> Result<bool, DomainError> {
            Ok(true)
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Ignore,
        FailDatabase,
        FailResolution,
        FailPlan,
    }

    /// Mock handler that tracks invocations.
    struct MockHandler {
        handles_types: Vec<StripeEventType>,
        call_count: AtomicU32,
        behaviour: RwLock<Behaviour>,
    }

    impl MockHandler {
        fn new(handles: Vec<StripeEventType>, behaviour: Behaviour) -> Self {
            Self {
                handles_types: handles,
                call_count: AtomicU32::new(0),
                behaviour: RwLock::new(behaviour),
            }
        }

        fn call_count(&self) -> u32 {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebhookEventHandler for MockHandler {
        fn handles(&self) -> Vec<StripeEventType> {
            self.handles_types.clone()
        }

        async fn handle(&self, _event: &StripeEvent) -> Result<(), WebhookError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match *self.behaviour.read().await {
                Behaviour::Succeed => Ok(()),
                Behaviour::Ignore => Err(WebhookError::Ignored("Test ignore".to_string())),
                Behaviour::FailDatabase => {
                    Err(WebhookError::Database("Simulated failure".to_string()))
                }
                Behaviour::FailResolution => Err(ResolutionError::NoHints.into()),
                Behaviour::FailPlan => Err(PlanError::UnknownPrice("price_x".to_string()).into()),
            }
        }
    }

    struct SingleHandlerDispatcher {
        handler: Arc<MockHandler>,
    }

    #[async_trait]
    impl WebhookDispatcher for SingleHandlerDispatcher {
        fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler> {
            if self.handler.handles_types.contains(event_type) {
                Some(self.handler.as_ref())
            } else {
                None
            }
        }
    }

    struct Fixture {
        ledger: Arc<MockLedger>,
        dead_letters: Arc<MockDeadLetters>,
        handler: Arc<MockHandler>,
        processor: IdempotentWebhookProcessor,
    }

    fn fixture(behaviour: Behaviour) -> Fixture {
        let ledger = Arc::new(MockLedger::default());
        let dead_letters = Arc::new(MockDeadLetters::default());
        let handler = Arc::new(MockHandler::new(
            vec![StripeEventType::SubscriptionCreated],
            behaviour,
        ));
        let processor = IdempotentWebhookProcessor::new(
            ledger.clone(),
            dead_letters.clone(),
            Arc::new(SingleHandlerDispatcher {
                handler: handler.clone(),
            }),
        );
        Fixture {
            ledger,
            dead_letters,
            handler,
            processor,
        }
    }

    fn test_event(id: &str, event_type: &str) -> StripeEvent {
        StripeEventBuilder::new().id(id).event_type(event_type).build()
    }

    // ══════════════════════════════════════════════════════════════
    // WebhookDispatcher Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn dispatcher_ignores_unknown_event_types() {
        let f = fixture(Behaviour::Succeed);

        let result = f
            .processor
            .process(test_event("evt_unknown", "customer.tax_id.created"))
            .await;

        assert_eq!(result.unwrap(), WebhookResult::Ignored);
        assert_eq!(f.handler.call_count(), 0);
        let record = f.ledger.find_by_event_id("evt_unknown").await.unwrap().unwrap();
        assert_eq!(record.result, LedgerResult::Ignored);
    }

    // ══════════════════════════════════════════════════════════════
    // IdempotentWebhookProcessor Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn processor_processes_new_event_successfully() {
        let f = fixture(Behaviour::Succeed);

        let result = f
            .processor
            .process(test_event("evt_new", "customer.subscription.created"))
            .await;

        assert_eq!(result.unwrap(), WebhookResult::Processed);
        assert_eq!(f.handler.call_count(), 1);
        let record = f.ledger.find_by_event_id("evt_new").await.unwrap().unwrap();
        assert_eq!(record.result, LedgerResult::Success);
    }

    #[tokio::test]
    async fn processor_returns_already_processed_for_duplicate() {
        let f = fixture(Behaviour::Succeed);

        f.processor
            .process(test_event("evt_dup", "customer.subscription.created"))
            .await
            .unwrap();
        let result = f
            .processor
            .process(test_event("evt_dup", "customer.subscription.created"))
            .await;

        assert_eq!(result.unwrap(), WebhookResult::AlreadyProcessed);
        assert_eq!(f.handler.call_count(), 1);
    }

    #[tokio::test]
    async fn processor_records_ignored_outcome() {
        let f = fixture(Behaviour::Ignore);

        let result = f
            .processor
            .process(test_event("evt_ignore", "customer.subscription.created"))
            .await;

        assert_eq!(result.unwrap(), WebhookResult::Ignored);
    }

    #[tokio::test]
    async fn retryable_failure_is_not_recorded() {
        let f = fixture(Behaviour::FailDatabase);

        let result = f
            .processor
            .process(test_event("evt_fail", "customer.subscription.created"))
            .await;

        assert!(matches!(result, Err(WebhookError::Database(_))));
        assert!(f.ledger.find_by_event_id("evt_fail").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_after_transient_failure_runs_handler_again() {
        let f = fixture(Behaviour::FailDatabase);
        let event = test_event("evt_retry", "customer.subscription.created");

        assert!(f.processor.process(event.clone()).await.is_err());
        *f.handler.behaviour.write().await = Behaviour::Succeed;
        let result = f.processor.process(event).await;

        assert_eq!(result.unwrap(), WebhookResult::Processed);
        assert_eq!(f.handler.call_count(), 2);
    }

    #[tokio::test]
    async fn resolution_failure_is_dead_lettered() {
        let f = fixture(Behaviour::FailResolution);

        let result = f
            .processor
            .process(test_event("evt_orphan", "customer.subscription.created"))
            .await
            .unwrap();

        let letters = f.dead_letters.letters.read().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(result, WebhookResult::DeadLettered(letters[0].id));
        assert_eq!(letters[0].event_id, "evt_orphan");
        let record = f.ledger.find_by_event_id("evt_orphan").await.unwrap().unwrap();
        assert_eq!(record.result, LedgerResult::DeadLettered);
    }

    #[tokio::test]
    async fn concurrent_delivery_reuses_the_open_letter() {
        let f = fixture(Behaviour::FailResolution);
        let event = test_event("evt_orphan", "customer.subscription.created");
        // Another delivery parked the event but has not reached the ledger yet
        let parked = DeadLetter::new(&event, "no user matches").unwrap();
        let parked_id = parked.id;
        f.dead_letters.push(parked).await.unwrap();

        let result = f.processor.process(event).await.unwrap();

        assert_eq!(result, WebhookResult::DeadLettered(parked_id));
        assert_eq!(f.dead_letters.letters.read().await.len(), 1);
        let record = f.ledger.find_by_event_id("evt_orphan").await.unwrap().unwrap();
        assert_eq!(record.result, LedgerResult::DeadLettered);
    }

    #[tokio::test]
    async fn unknown_price_is_dead_lettered() {
        let f = fixture(Behaviour::FailPlan);

        let result = f
            .processor
            .process(test_event("evt_price", "customer.subscription.created"))
            .await
            .unwrap();

        assert!(matches!(result, WebhookResult::DeadLettered(_)));
        let letters = f.dead_letters.letters.read().await;
        assert!(letters[0].reason.contains("price_x"));
    }

    #[tokio::test]
    async fn replay_flips_ledger_to_success() {
        let f = fixture(Behaviour::FailResolution);
        let event = test_event("evt_replay", "customer.subscription.created");
        f.processor.process(event.clone()).await.unwrap();

        *f.handler.behaviour.write().await = Behaviour::Succeed;
        let result = f.processor.replay(&event).await;

        assert_eq!(result.unwrap(), WebhookResult::Processed);
        let record = f.ledger.find_by_event_id("evt_replay").await.unwrap().unwrap();
        assert_eq!(record.result, LedgerResult::Success);
    }

    #[tokio::test]
    async fn replay_that_fails_again_returns_error() {
        let f = fixture(Behaviour::FailResolution);
        let event = test_event("evt_still_bad", "customer.subscription.created");
        f.processor.process(event.clone()).await.unwrap();

        let result = f.processor.replay(&event).await;

        assert!(matches!(result, Err(WebhookError::Unresolved(_))));
        let record = f
            .ledger
            .find_by_event_id("evt_still_bad")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.result, LedgerResult::DeadLettered);
    }
}
