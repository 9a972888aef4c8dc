//! Stripe REST client implementing `StripeGateway`.
//!
//! Read-only: the synchronizer never creates or mutates Stripe objects. Used
//! to fetch a customer's email for identity resolution and the subscription
//! behind a completed checkout session.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::billing::{StripeCustomer, StripeSubscription};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::StripeGateway;

const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the Stripe REST API.
#[derive(Debug, Error)]
pub enum StripeApiError {
    #[error("Stripe request failed: {0}")]
    Network(String),

    #[error("Stripe API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse Stripe response: {0}")]
    Decode(String),
}

impl From<StripeApiError> for DomainError {
    fn from(err: StripeApiError) -> Self {
        DomainError::new(ErrorCode::ExternalServiceError, err.to_string())
    }
}

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeApiConfig {
    /// Stripe secret or restricted key (sk_... / rk_...).
    api_key: SecretString,

    /// Base URL including the version path.
    api_base_url: String,
}

impl StripeApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Set a custom API base URL (stripe-mock, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Stripe API adapter.
pub struct StripeApiClient {
    config: StripeApiConfig,
    http_client: reqwest::Client,
}

impl StripeApiClient {
    pub fn new(config: StripeApiConfig) -> Result<Self, StripeApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StripeApiError::Network(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn object_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.config.api_base_url, collection, id)
    }

    /// GETs one object. `None` on 404.
    async fn retrieve<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StripeApiError> {
        let response = self
            .http_client
            .get(self.object_url(collection, id))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| StripeApiError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StripeApiError::Api { status, body });
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| StripeApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StripeGateway for StripeApiClient {
    async fn get_customer(&self, customer_id: &str) -> Result<Option<StripeCustomer>, DomainError> {
        let customer: Option<StripeCustomer> = self.retrieve("customers", customer_id).await?;
        Ok(customer.filter(|c| !c.deleted))
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<StripeSubscription>, DomainError> {
        Ok(self.retrieve("subscriptions", subscription_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_joins_collection_and_id() {
        let client = StripeApiClient::new(
            StripeApiConfig::new("sk_test_xxx").with_base_url("http://localhost:12111/v1/"),
        )
        .unwrap();

        assert_eq!(
            client.object_url("customers", "cus_123"),
            "http://localhost:12111/v1/customers/cus_123"
        );
    }

    #[test]
    fn api_errors_map_to_external_service_error() {
        let err: DomainError = StripeApiError::Api {
            status: 500,
            body: "oops".to_string(),
        }
        .into();

        assert_eq!(err.code, ErrorCode::ExternalServiceError);
        assert!(err.message.contains("500"));
    }

    #[test]
    fn deleted_customer_payload_parses() {
        let customer: StripeCustomer =
            serde_json::from_str(r#"{"id": "cus_1", "deleted": true}"#).unwrap();
        assert!(customer.deleted);
    }
}
