//! Firestore configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Document store configuration (Firestore REST)
#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
    /// Google Cloud project id
    pub project_id: String,

    /// Firestore database id
    #[serde(default = "default_database_id")]
    pub database_id: String,

    /// Collection holding the user documents
    #[serde(default = "default_collection")]
    pub users_collection: String,

    /// Service account key, raw JSON or base64-encoded JSON
    pub service_account: Option<String>,

    /// Emulator host (`localhost:8081`); disables authentication
    pub emulator_host: Option<String>,

    /// REST base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl FirestoreConfig {
    /// Base URL requests are sent to, honoring the emulator
    pub fn effective_base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}/v1", host.trim_end_matches('/')),
            None => self.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn uses_emulator(&self) -> bool {
        self.emulator_host.is_some()
    }

    /// Validate Firestore configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.project_id.is_empty() {
            return Err(ValidationError::MissingRequired("FIRESTORE_PROJECT_ID"));
        }
        let valid_project = self
            .project_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_project {
            return Err(ValidationError::InvalidFirestoreProject);
        }
        if self.service_account.is_none() && !self.uses_emulator() {
            return Err(ValidationError::MissingRequired("FIRESTORE_SERVICE_ACCOUNT"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database_id: default_database_id(),
            users_collection: default_collection(),
            service_account: None,
            emulator_host: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_database_id() -> String {
    "(default)".to_string()
}

fn default_collection() -> String {
    "users".to_string()
}

fn default_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_timeout() -> u64 {
    10
}
