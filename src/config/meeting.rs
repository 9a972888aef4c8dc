//! Meeting provider configuration (Google Calendar + Meet)

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingConfig {
    /// Service account key, raw JSON or base64-encoded JSON.
    /// Without it only the development mock is available.
    pub service_account: Option<String>,

    /// Calendar the events are created in
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// Workspace user to impersonate (domain-wide delegation)
    pub delegated_user: Option<String>,

    /// Calendar API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl MeetingConfig {
    pub fn is_configured(&self) -> bool {
        self.service_account.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.calendar_id.trim().is_empty() {
            return Err(ValidationError::InvalidCalendarId);
        }
        if let Some(user) = &self.delegated_user {
            if !user.contains('@') {
                return Err(ValidationError::MissingRequired("MEETING_DELEGATED_USER"));
            }
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            service_account: None,
            calendar_id: default_calendar_id(),
            delegated_user: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_timeout() -> u64 {
    15
}
