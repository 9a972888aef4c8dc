//! HTTP adapter for Stripe webhooks.
//!
//! - `POST /api/webhooks/stripe` - Verify, deduplicate and apply an event

mod handlers;
mod routes;

pub use handlers::{handle_stripe_webhook, WebhookResponse};
pub use routes::webhook_routes;
