//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod dead_letters;
pub mod meeting;
pub mod reconcile;
pub mod sync;

pub use dead_letters::{
    DeadLetterError, ListDeadLettersHandler, ReplayDeadLetterHandler, ResolveDeadLetterHandler,
};
pub use meeting::CreateMeetingLinkHandler;
pub use reconcile::ReconcileDocumentsHandler;
pub use sync::{BillingEventDispatcher, IdentityResolver};
