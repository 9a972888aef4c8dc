//! HTTP adapters - REST API implementations.
//!
//! - `webhook` - Stripe webhook intake
//! - `admin` - Reconciliation and dead-letter administration
//! - `meeting` - Meeting link creation
//!
//! `app_router` assembles them with the shared middleware stack.

pub mod admin;
pub mod error;
pub mod meeting;
pub mod middleware;
mod router;
mod state;
pub mod webhook;

pub use error::{ApiError, ErrorResponse};
pub use router::app_router;
pub use state::{ReconcileSettings, SyncAppState};
