//! Top-level router and middleware stack.

use axum::http::{header, HeaderValue, Method};
use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::admin::admin_routes;
use super::meeting::meeting_routes;
use super::middleware::require_admin_token;
use super::webhook::webhook_routes;
use super::SyncAppState;
use crate::config::ServerConfig;

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Browser access to the meetings API, if any origins are configured.
fn meetings_cors(server: &ServerConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = server
        .allowed_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

/// Builds the application router.
///
/// # Routes
/// - `GET /health`
/// - `POST /api/webhooks/stripe`
/// - `POST /api/meetings`
/// - `/api/admin/*` (only when an admin token is configured)
pub fn app_router(state: SyncAppState, server: &ServerConfig) -> Router {
    let mut meetings = meeting_routes();
    if let Some(cors) = meetings_cors(server) {
        meetings = meetings.layer(cors);
    }

    let mut api = Router::new()
        .nest("/webhooks", webhook_routes())
        .nest("/meetings", meetings);

    if let Some(token) = state.admin_token.clone() {
        api = api.nest(
            "/admin",
            admin_routes().layer(middleware::from_fn_with_state(token, require_admin_token)),
        );
    }

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CompressionLayer::new())
                .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
                .layer(TimeoutLayer::new(server.request_timeout())),
        )
}
