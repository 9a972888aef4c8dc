//! Stripe webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::adapters::http::{ApiError, SyncAppState};
use crate::domain::billing::WebhookError;
use crate::ports::WebhookResult;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Acknowledgement body returned to Stripe.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    /// `processed`, `ignored`, `already_processed` or `dead_lettered`.
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_id: Option<String>,
}

impl From<WebhookResult> for WebhookResponse {
    fn from(result: WebhookResult) -> Self {
        let dead_letter_id = match result {
            WebhookResult::DeadLettered(id) => Some(id.to_string()),
            _ => None,
        };
        Self {
            received: true,
            result: result.as_str(),
            dead_letter_id,
        }
    }
}

/// POST /api/webhooks/stripe - Handle Stripe webhook events
///
/// Parked and ignored events are acknowledged with 200. Store or provider
/// failures return 500 so Stripe redelivers.
pub async fn handle_stripe_webhook(
    State(state): State<SyncAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebhookError::ParseError("Missing Stripe-Signature header".to_string()))?;

    let event = state
        .verifier
        .verify_and_parse(&body, signature)
        .map_err(|e| {
            warn!(error = %e, "Rejected webhook delivery");
            e
        })?;

    let result = state.processor.process(event).await?;
    Ok(Json(WebhookResponse::from(result)))
}
