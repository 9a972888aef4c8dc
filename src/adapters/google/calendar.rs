//! Google Calendar adapter creating events with a Meet conference.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token_source::ServiceAccountTokenSource;
use crate::ports::{MeetingError, MeetingLink, MeetingProvider, MeetingRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: EventTime,
    end: EventTime,
    attendees: Vec<Attendee<'a>>,
    conference_data: ConferenceData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: String,
}

#[derive(Debug, Serialize)]
struct Attendee<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    create_request: CreateConferenceRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConferenceRequest {
    request_id: String,
    conference_solution_key: ConferenceSolutionKey,
}

#[derive(Debug, Serialize)]
struct ConferenceSolutionKey {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedEvent {
    id: String,
    hangout_link: Option<String>,
    conference_data: Option<CreatedConference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedConference {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    entry_point_type: String,
    uri: String,
}

impl CreatedEvent {
    fn meeting_url(&self) -> Option<&str> {
        self.hangout_link.as_deref().or_else(|| {
            self.conference_data.as_ref().and_then(|c| {
                c.entry_points
                    .iter()
                    .find(|e| e.entry_point_type == "video")
                    .map(|e| e.uri.as_str())
            })
        })
    }
}

fn event_body(request: &MeetingRequest) -> EventBody<'_> {
    EventBody {
        summary: &request.title,
        description: request.description.as_deref(),
        start: EventTime {
            date_time: request.start.to_rfc3339(),
        },
        end: EventTime {
            date_time: request.end.to_rfc3339(),
        },
        attendees: request
            .attendees
            .iter()
            .map(|email| Attendee { email })
            .collect(),
        conference_data: ConferenceData {
            create_request: CreateConferenceRequest {
                request_id: Uuid::new_v4().to_string(),
                conference_solution_key: ConferenceSolutionKey {
                    kind: "hangoutsMeet",
                },
            },
        },
    }
}

/// Creates meetings as Calendar events with a Google Meet conference.
pub struct GoogleMeetProvider {
    tokens: Arc<ServiceAccountTokenSource>,
    http_client: reqwest::Client,
    api_base: String,
    calendar_id: String,
}

impl GoogleMeetProvider {
    pub fn new(
        tokens: Arc<ServiceAccountTokenSource>,
        http_client: reqwest::Client,
        api_base: impl Into<String>,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            http_client,
            api_base: api_base.into(),
            calendar_id: calendar_id.into(),
        }
    }

    fn events_url(&self) -> Result<reqwest::Url, MeetingError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| MeetingError::Provider(format!("invalid calendar API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| MeetingError::Provider("calendar API base cannot be a base".to_string()))?
            .pop_if_empty()
            .push("calendars")
            .push(&self.calendar_id)
            .push("events");
        url.query_pairs_mut()
            .append_pair("conferenceDataVersion", "1")
            .append_pair("sendUpdates", "all");
        Ok(url)
    }
}

#[async_trait]
impl MeetingProvider for GoogleMeetProvider {
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingLink, MeetingError> {
        request.validate()?;

        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| MeetingError::Provider(e.to_string()))?;

        let response = self
            .http_client
            .post(self.events_url()?)
            .bearer_auth(token.expose_secret())
            .json(&event_body(request))
            .send()
            .await
            .map_err(|e| MeetingError::Provider(format!("calendar request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MeetingError::Provider(format!(
                "calendar API returned {}: {}",
                status, body
            )));
        }

        let event: CreatedEvent = response
            .json()
            .await
            .map_err(|e| MeetingError::Provider(format!("invalid calendar response: {}", e)))?;

        let meeting_url = event
            .meeting_url()
            .ok_or_else(|| MeetingError::Provider("event has no Meet conference".to_string()))?
            .to_string();

        tracing::info!(calendar_event_id = %event.id, "Meeting created");

        Ok(MeetingLink {
            meeting_url,
            calendar_event_id: Some(event.id),
            mock: false,
        })
    }
}
