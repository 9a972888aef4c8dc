//! Google adapters - service account auth and the Calendar/Meet provider.

mod calendar;
mod mock_meeting;
mod service_account;
mod token_source;

pub use calendar::GoogleMeetProvider;
pub use mock_meeting::MockMeetingProvider;
pub use service_account::ServiceAccountKey;
pub use token_source::{ServiceAccountTokenSource, CALENDAR_SCOPE, FIRESTORE_SCOPE};

use thiserror::Error;

/// Errors obtaining Google credentials or tokens.
#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(String),

    #[error("Failed to sign token assertion: {0}")]
    Signing(String),

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Token endpoint returned {status}: {body}")]
    TokenRejected { status: u16, body: String },
}
