//! OAuth2 access tokens for a service account (JWT bearer grant).
//!
//! A signed RS256 assertion is exchanged at the key's `token_uri` for an
//! access token, which is cached until shortly before it expires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::service_account::ServiceAccountKey;
use super::GoogleAuthError;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Access token source for one service account and scope.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    scope: String,
    subject: Option<String>,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, scope: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            key,
            scope: scope.into(),
            subject: None,
            http_client,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Impersonate a Workspace user (domain-wide delegation).
    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    /// Signs the JWT bearer assertion.
    fn assertion(&self, now: i64) -> Result<String, GoogleAuthError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
            sub: self.subject.as_deref(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.key.private_key.expose_secret().as_bytes())
            .map_err(|e| GoogleAuthError::Signing(e.to_string()))?;
        encode(&header, &claims, &key).map_err(|e| GoogleAuthError::Signing(e.to_string()))
    }

    async fn fetch_token(&self) -> Result<CachedToken, GoogleAuthError> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;

        tracing::debug!(client_email = %self.key.client_email, scope = %self.scope, "Fetching Google access token");

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| GoogleAuthError::TokenRequest(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GoogleAuthError::TokenRejected { status, body });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GoogleAuthError::TokenRequest(format!("invalid token response: {}", e)))?;

        Ok(CachedToken {
            token: SecretString::new(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// Returns a valid access token, fetching a new one when the cached one is stale.
    pub async fn access_token(&self) -> Result<SecretString, GoogleAuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.is_fresh() {
                    return Ok(SecretString::new(cached.token.expose_secret().clone()));
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(ref cached) = *cache {
            if cached.is_fresh() {
                return Ok(SecretString::new(cached.token.expose_secret().clone()));
            }
        }
        let fresh = self.fetch_token().await?;
        let token = SecretString::new(fresh.token.expose_secret().clone());
        *cache = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_near_expiry_is_not_fresh() {
        let token = CachedToken {
            token: SecretString::new("ya29.x".to_string()),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!token.is_fresh());

        let token = CachedToken {
            token: SecretString::new("ya29.x".to_string()),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(token.is_fresh());
    }

    #[test]
    fn assertion_with_invalid_pem_is_a_signing_error() {
        let key = ServiceAccountKey::parse(
            r#"{"private_key": "not a pem", "client_email": "sync@example.iam.gserviceaccount.com"}"#,
        )
        .unwrap();
        let source = ServiceAccountTokenSource::new(key, FIRESTORE_SCOPE, reqwest::Client::new());

        assert!(matches!(
            source.assertion(1_700_000_000),
            Err(GoogleAuthError::Signing(_))
        ));
    }

    #[test]
    fn claims_omit_subject_unless_delegating() {
        let claims = AssertionClaims {
            iss: "sync@example.iam.gserviceaccount.com",
            scope: CALENDAR_SCOPE,
            aud: "https://oauth2.googleapis.com/token",
            iat: 0,
            exp: 3600,
            sub: None,
        };
        let json = serde_json::to_value(&claims).unwrap();

        assert!(json.get("sub").is_none());
        assert_eq!(json["scope"], CALENDAR_SCOPE);
    }
}
