//! HTTP adapter for the admin API.
//!
//! - `POST /api/admin/reconcile` - Compare and repair user documents
//! - `GET /api/admin/dead-letters` - List open dead letters
//! - `POST /api/admin/dead-letters/:id/replay` - Replay a dead letter
//! - `POST /api/admin/dead-letters/:id/resolve` - Resolve a dead letter by hand

mod handlers;
mod routes;

pub use handlers::{list_dead_letters, reconcile_documents, replay_dead_letter, resolve_dead_letter};
pub use routes::admin_routes;
