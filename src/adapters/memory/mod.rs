//! In-memory adapters for every port.
//!
//! Used by unit and integration tests, and for running the service without
//! Postgres or Firestore. Not durable.

mod billing_store;
mod dead_letter_queue;
mod document_store;
mod stripe_gateway;
mod webhook_event_repository;

pub use billing_store::{InMemoryBillingStore, StoredPaymentMethod};
pub use dead_letter_queue::InMemoryDeadLetterQueue;
pub use document_store::InMemoryDocumentStore;
pub use stripe_gateway::InMemoryStripeGateway;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
