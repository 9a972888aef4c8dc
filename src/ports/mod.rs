//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Billing Ports
//!
//! - `BillingStore` - Relational source of truth, one transaction per event
//! - `ProjectionOutbox` - Pending user document projections
//! - `DocumentStore` - Read-optimized user documents
//! - `StripeGateway` - Stripe API reads
//!
//! ## Webhook Ports
//!
//! - `WebhookEventRepository` - Stripe webhook idempotency ledger
//! - `DeadLetterQueue` - Events parked for manual reconciliation
//!
//! ## Meeting Ports
//!
//! - `MeetingProvider` - Video meeting link creation

mod billing_store;
mod dead_letter_queue;
mod document_store;
mod meeting_provider;
mod projection_outbox;
mod stripe_gateway;
mod webhook_event_repository;

pub use billing_store::BillingStore;
pub use dead_letter_queue::{DeadLetter, DeadLetterQueue};
pub use document_store::DocumentStore;
pub use meeting_provider::{MeetingError, MeetingLink, MeetingProvider, MeetingRequest};
pub use projection_outbox::{ProjectionEntry, ProjectionOutbox, ProjectionStatus};
pub use stripe_gateway::StripeGateway;
pub use webhook_event_repository::{
    LedgerResult, SaveResult, WebhookEventRecord, WebhookEventRepository, WebhookResult,
};
