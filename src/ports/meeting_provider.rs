//! MeetingProvider port - Creates video meeting links.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A meeting to schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

impl MeetingRequest {
    pub fn validate(&self) -> Result<(), MeetingError> {
        if self.title.trim().is_empty() {
            return Err(MeetingError::InvalidRequest("title is required".to_string()));
        }
        if self.end <= self.start {
            return Err(MeetingError::InvalidRequest(
                "end must be after start".to_string(),
            ));
        }
        if let Some(bad) = self.attendees.iter().find(|a| !a.contains('@')) {
            return Err(MeetingError::InvalidRequest(format!(
                "attendee '{}' is not an email address",
                bad
            )));
        }
        Ok(())
    }
}

/// The created meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingLink {
    pub meeting_url: String,
    pub calendar_event_id: Option<String>,
    /// True when the link came from the development fallback.
    pub mock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeetingError {
    #[error("invalid meeting request: {0}")]
    InvalidRequest(String),

    #[error("meeting provider is not configured")]
    NotConfigured,

    #[error("meeting provider failed: {0}")]
    Provider(String),
}

#[async_trait]
pub trait MeetingProvider: Send + Sync {
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingLink, MeetingError>;
}
