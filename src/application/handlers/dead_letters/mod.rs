//! Dead-letter administration handlers.
//!
//! ## Queries
//! - Listing open dead letters
//!
//! ## Commands
//! - Replaying a dead letter through the dispatcher
//! - Resolving a dead letter by hand

mod list_dead_letters;
mod replay_dead_letter;
mod resolve_dead_letter;

pub use list_dead_letters::{DeadLetterView, ListDeadLettersHandler, ListDeadLettersQuery};
pub use replay_dead_letter::{
    ReplayDeadLetterCommand, ReplayDeadLetterHandler, ReplayDeadLetterResult,
};
pub use resolve_dead_letter::{
    ResolveDeadLetterCommand, ResolveDeadLetterHandler, ResolveDeadLetterRequest,
};

use thiserror::Error;

use crate::domain::billing::WebhookError;
use crate::domain::foundation::{DeadLetterId, DomainError};

/// Errors from dead-letter administration.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead letter {0} not found")]
    NotFound(DeadLetterId),

    #[error("dead letter {0} is already resolved")]
    AlreadyResolved(DeadLetterId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The stored event failed again; the letter stays open.
    #[error("replay failed: {0}")]
    ReplayFailed(#[source] WebhookError),

    #[error(transparent)]
    Store(#[from] DomainError),
}
