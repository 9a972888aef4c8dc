//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, error types and the state machine trait that form
//! the vocabulary of the synchronizer domain.

mod errors;
mod ids;
mod state_machine;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{DeadLetterId, UserId};
pub use state_machine::StateMachine;
