//! Google service account credentials.
//!
//! Deployment platforms differ in how they inject the key file, so the
//! credentials are accepted either as the raw JSON document or as its
//! base64 encoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::SecretString;
use serde::Deserialize;

use super::GoogleAuthError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The fields of a service account key file the token flow needs.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,

    pub project_id: Option<String>,

    pub private_key_id: Option<String>,

    /// PEM-encoded RSA private key.
    pub private_key: SecretString,

    pub client_email: String,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Parses a key from raw JSON or base64-encoded JSON.
    pub fn parse(input: &str) -> Result<Self, GoogleAuthError> {
        let trimmed = input.trim();
        let json = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD.decode(compact).map_err(|e| {
                GoogleAuthError::InvalidCredentials(format!("not JSON and not base64: {}", e))
            })?;
            String::from_utf8(bytes).map_err(|e| {
                GoogleAuthError::InvalidCredentials(format!("decoded key is not UTF-8: {}", e))
            })?
        };

        let key: ServiceAccountKey = serde_json::from_str(&json)
            .map_err(|e| GoogleAuthError::InvalidCredentials(e.to_string()))?;

        if let Some(kind) = &key.key_type {
            if kind != "service_account" {
                return Err(GoogleAuthError::InvalidCredentials(format!(
                    "expected a service_account key, got '{}'",
                    kind
                )));
            }
        }
        if key.client_email.is_empty() {
            return Err(GoogleAuthError::InvalidCredentials(
                "client_email is empty".to_string(),
            ));
        }
        Ok(key)
    }
}
