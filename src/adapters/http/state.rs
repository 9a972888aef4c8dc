//! Shared application state for the HTTP adapters.

use std::sync::Arc;

use secrecy::SecretString;

use crate::application::handlers::dead_letters::{
    ListDeadLettersHandler, ReplayDeadLetterHandler, ResolveDeadLetterHandler,
};
use crate::application::handlers::meeting::CreateMeetingLinkHandler;
use crate::application::handlers::reconcile::ReconcileDocumentsHandler;
use crate::domain::billing::{IdempotentWebhookProcessor, StripeWebhookVerifier};
use crate::ports::{BillingStore, DeadLetterQueue, DocumentStore};

/// Paging and fan-out for reconciliation runs.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    pub page_size: i64,
    pub concurrency: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            concurrency: 8,
        }
    }
}

/// Shared application state containing all dependencies.
///
/// Cloned for each request; every dependency is Arc-wrapped.
#[derive(Clone)]
pub struct SyncAppState {
    pub verifier: Arc<StripeWebhookVerifier>,
    pub processor: Arc<IdempotentWebhookProcessor>,
    pub billing: Arc<dyn BillingStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub dead_letters: Arc<dyn DeadLetterQueue>,
    pub meetings: Arc<CreateMeetingLinkHandler>,
    pub reconcile: ReconcileSettings,
    /// Admin routes are not mounted without a token.
    pub admin_token: Option<Arc<SecretString>>,
}

impl SyncAppState {
    pub fn reconcile_handler(&self) -> ReconcileDocumentsHandler {
        ReconcileDocumentsHandler::new(
            self.billing.clone(),
            self.documents.clone(),
            self.reconcile.page_size,
            self.reconcile.concurrency,
        )
    }

    pub fn list_dead_letters_handler(&self) -> ListDeadLettersHandler {
        ListDeadLettersHandler::new(self.dead_letters.clone())
    }

    pub fn replay_dead_letter_handler(&self) -> ReplayDeadLetterHandler {
        ReplayDeadLetterHandler::new(self.dead_letters.clone(), self.processor.clone())
    }

    pub fn resolve_dead_letter_handler(&self) -> ResolveDeadLetterHandler {
        ResolveDeadLetterHandler::new(self.dead_letters.clone())
    }
}
