//! Error responses shared by every HTTP adapter.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::application::handlers::dead_letters::DeadLetterError;
use crate::domain::billing::WebhookError;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::MeetingError;

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

/// API error type that converts layer errors to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    Webhook(WebhookError),
    DeadLetter(DeadLetterError),
    Meeting(MeetingError),
    Domain(DomainError),
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl From<DeadLetterError> for ApiError {
    fn from(err: DeadLetterError) -> Self {
        Self::DeadLetter(err)
    }
}

impl From<MeetingError> for ApiError {
    fn from(err: MeetingError) -> Self {
        Self::Meeting(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

fn webhook_parts(err: &WebhookError) -> (StatusCode, &'static str) {
    let code = match err {
        WebhookError::InvalidSignature => "INVALID_SIGNATURE",
        WebhookError::TimestampOutOfRange | WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
        WebhookError::ParseError(_) | WebhookError::MissingField(_) => "INVALID_PAYLOAD",
        WebhookError::TestModeRejected => "TEST_MODE_REJECTED",
        WebhookError::Unresolved(_) => "UNRESOLVED_IDENTITY",
        WebhookError::Plan(_) => "UNKNOWN_PLAN",
        WebhookError::Ignored(_) => "IGNORED",
        WebhookError::Database(_) | WebhookError::DocumentStore(_) | WebhookError::Provider(_) => {
            "PROCESSING_FAILED"
        }
    };
    (err.status_code(), code)
}

fn domain_parts(err: &DomainError) -> (StatusCode, &'static str) {
    match err.code {
        ErrorCode::ValidationFailed => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
        ErrorCode::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        ErrorCode::DeadLetterNotFound => (StatusCode::NOT_FOUND, "DEAD_LETTER_NOT_FOUND"),
        ErrorCode::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
        ErrorCode::ExternalServiceError | ErrorCode::DocumentStoreError => {
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
        }
        ErrorCode::DatabaseError | ErrorCode::InternalError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Webhook(e) => webhook_parts(e),
            ApiError::DeadLetter(e) => match e {
                DeadLetterError::NotFound(_) => (StatusCode::NOT_FOUND, "DEAD_LETTER_NOT_FOUND"),
                DeadLetterError::AlreadyResolved(_) => (StatusCode::CONFLICT, "ALREADY_RESOLVED"),
                DeadLetterError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
                DeadLetterError::ReplayFailed(inner) if inner.is_retryable() => {
                    (StatusCode::SERVICE_UNAVAILABLE, "REPLAY_FAILED")
                }
                DeadLetterError::ReplayFailed(_) => (StatusCode::CONFLICT, "REPLAY_FAILED"),
                DeadLetterError::Store(inner) => domain_parts(inner),
            },
            ApiError::Meeting(e) => match e {
                MeetingError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
                MeetingError::NotConfigured => {
                    (StatusCode::SERVICE_UNAVAILABLE, "MEETINGS_NOT_CONFIGURED")
                }
                MeetingError::Provider(_) => (StatusCode::BAD_GATEWAY, "MEETING_PROVIDER_ERROR"),
            },
            ApiError::Domain(e) => domain_parts(e),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Webhook(e) => e.to_string(),
            ApiError::DeadLetter(e) => e.to_string(),
            ApiError::Meeting(e) => e.to_string(),
            ApiError::Domain(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = if status.is_server_error() {
            error!(error_code = code, error = %self.message(), "Request failed");
            // Internal details stay in the logs
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                "An internal error occurred".to_string()
            } else {
                self.message()
            }
        } else {
            self.message()
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
