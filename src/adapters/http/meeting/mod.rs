//! HTTP adapter for meeting links.
//!
//! - `POST /api/meetings` - Create a calendar event with a Meet link

mod handlers;

pub use handlers::create_meeting;

use axum::{routing::post, Router};

use crate::adapters::http::SyncAppState;

/// Meeting routes, mounted at `/api/meetings`.
pub fn meeting_routes() -> Router<SyncAppState> {
    Router::new().route("/", post(create_meeting))
}
