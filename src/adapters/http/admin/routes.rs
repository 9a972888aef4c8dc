use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    list_dead_letters, reconcile_documents, replay_dead_letter, resolve_dead_letter,
};
use crate::adapters::http::SyncAppState;

/// Admin routes, mounted at `/api/admin` behind `require_admin_token`.
pub fn admin_routes() -> Router<SyncAppState> {
    Router::new()
        .route("/reconcile", post(reconcile_documents))
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/:id/replay", post(replay_dead_letter))
        .route("/dead-letters/:id/resolve", post(resolve_dead_letter))
}
