//! Bearer token guard for `/api/admin/*`.
//!
//! ```text
//! Request → require_admin_token → constant-time compare → handler
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::adapters::http::ErrorResponse;

/// Middleware state: the configured admin token.
pub type AdminToken = Arc<SecretString>;

/// Rejects requests whose `Authorization: Bearer` token does not match.
pub async fn require_admin_token(
    State(expected): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let authorized = presented.map_or(false, |token| {
        token
            .as_bytes()
            .ct_eq(expected.expose_secret().as_bytes())
            .into()
    });

    if authorized {
        return next.run(request).await;
    }

    warn!(
        path = %request.uri().path(),
        token_present = presented.is_some(),
        "Admin request rejected"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(
            "AUTHENTICATION_REQUIRED",
            "A valid admin token is required",
        )),
    )
        .into_response()
}
