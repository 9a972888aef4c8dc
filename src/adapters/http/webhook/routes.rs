use axum::{routing::post, Router};

use super::handlers::handle_stripe_webhook;
use crate::adapters::http::SyncAppState;

/// Webhook routes, mounted at `/api/webhooks`.
///
/// No user authentication; requests are verified by signature.
pub fn webhook_routes() -> Router<SyncAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}
