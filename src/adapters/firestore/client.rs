//! Firestore REST client implementing `DocumentStore`.
//!
//! One client is built at startup and shared; every write is a merge
//! (`PATCH` with an update mask) so fields owned by the web client survive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::value::{decode_user_document, encode_user_document, Fields, USER_FIELD_PATHS};
use super::FirestoreError;
use crate::adapters::google::ServiceAccountTokenSource;
use crate::domain::billing::UserDocument;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::DocumentStore;

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    fields: &'a Fields,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    #[serde(default)]
    fields: Fields,
}

/// Firestore client scoped to one project, database and users collection.
pub struct FirestoreClient {
    http_client: reqwest::Client,
    /// `None` against the emulator.
    tokens: Option<Arc<ServiceAccountTokenSource>>,
    documents_url: String,
    collection: String,
}

impl FirestoreClient {
    pub fn new(
        base_url: &str,
        project_id: &str,
        database_id: &str,
        collection: impl Into<String>,
        tokens: Option<Arc<ServiceAccountTokenSource>>,
        timeout: Duration,
    ) -> Result<Self, FirestoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FirestoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            tokens,
            documents_url: format!(
                "{}/projects/{}/databases/{}/documents",
                base_url.trim_end_matches('/'),
                project_id,
                database_id
            ),
            collection: collection.into(),
        })
    }

    fn document_url(&self, user_id: &UserId) -> String {
        format!("{}/{}/{}", self.documents_url, self.collection, user_id)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, FirestoreError> {
        match &self.tokens {
            Some(tokens) => {
                let token = tokens.access_token().await?;
                Ok(request.bearer_auth(token.expose_secret()))
            }
            None => Ok(request),
        }
    }

    async fn merge(&self, user_id: &UserId, fields: &Fields) -> Result<(), FirestoreError> {
        let mask: Vec<(&str, &str)> = USER_FIELD_PATHS
            .iter()
            .map(|path| ("updateMask.fieldPaths", *path))
            .collect();

        let request = self
            .http_client
            .patch(self.document_url(user_id))
            .query(&mask)
            .json(&WriteBody { fields });
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| FirestoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FirestoreError::Api { status, body });
        }
        Ok(())
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<Fields>, FirestoreError> {
        let mask: Vec<(&str, &str)> = USER_FIELD_PATHS
            .iter()
            .map(|path| ("mask.fieldPaths", *path))
            .collect();

        let request = self.http_client.get(self.document_url(user_id)).query(&mask);
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| FirestoreError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FirestoreError::Api { status, body });
        }

        let document: DocumentResponse = response
            .json()
            .await
            .map_err(|e| FirestoreError::Decode(e.to_string()))?;
        Ok(Some(document.fields))
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn merge_user(
        &self,
        user_id: &UserId,
        document: &UserDocument,
    ) -> Result<(), DomainError> {
        let fields = encode_user_document(document);
        self.merge(user_id, &fields).await?;
        tracing::debug!(user_id = %user_id, status = %document.subscription.status, "User document merged");
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserDocument>, DomainError> {
        match self.fetch(user_id).await? {
            Some(fields) => Ok(decode_user_document(&fields)?),
            None => Ok(None),
        }
    }
}
