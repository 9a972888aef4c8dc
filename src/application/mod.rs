//! Application layer - Commands, Queries, and Handlers.
//!
//! Webhook handlers turn verified Stripe events into change sets for the
//! billing store. Admin handlers reconcile the projection and work the
//! dead-letter queue.

pub mod handlers;

pub use handlers::{
    BillingEventDispatcher, CreateMeetingLinkHandler, DeadLetterError, IdentityResolver,
    ListDeadLettersHandler, ReconcileDocumentsHandler, ReplayDeadLetterHandler,
    ResolveDeadLetterHandler,
};
