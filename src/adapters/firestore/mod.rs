//! Firestore adapter - the `users/{uid}` document projection.

mod client;
mod value;

pub use client::FirestoreClient;
pub use value::{decode_user_document, encode_user_document, MapValue, Value, USER_FIELD_PATHS};

use thiserror::Error;

use super::google::GoogleAuthError;
use crate::domain::foundation::DomainError;

/// Errors talking to Firestore.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Firestore authentication failed: {0}")]
    Auth(#[from] GoogleAuthError),

    #[error("Firestore request failed: {0}")]
    Network(String),

    #[error("Firestore returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected Firestore document shape: {0}")]
    Decode(String),
}

impl From<FirestoreError> for DomainError {
    fn from(err: FirestoreError) -> Self {
        DomainError::document_store(err.to_string())
    }
}
