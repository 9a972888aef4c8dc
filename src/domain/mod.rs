//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, errors, state machine trait)
//! - `billing` - Stripe webhook vocabulary and subscription summary rules

pub mod billing;
pub mod foundation;
