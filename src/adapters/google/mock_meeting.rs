//! Development stand-in for the meeting provider.

use async_trait::async_trait;
use uuid::Uuid;

use crate::ports::{MeetingError, MeetingLink, MeetingProvider, MeetingRequest};

/// Returns a well-formed but fake Meet link without calling Google.
#[derive(Debug, Default)]
pub struct MockMeetingProvider;

impl MockMeetingProvider {
    pub fn new() -> Self {
        Self
    }

    /// A Meet-shaped code (`xxx-xxxx-xxx`).
    fn meeting_code() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", &hex[0..3], &hex[3..7], &hex[7..10])
    }
}

#[async_trait]
impl MeetingProvider for MockMeetingProvider {
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingLink, MeetingError> {
        request.validate()?;
        Ok(MeetingLink {
            meeting_url: format!("https://meet.google.com/{}", Self::meeting_code()),
            calendar_event_id: None,
            mock: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn mock_link_is_flagged() {
        let start = Utc::now();
        let request = MeetingRequest {
            title: "Sync".to_string(),
            description: None,
            start,
            end: start + Duration::minutes(15),
            attendees: vec![],
        };

        let link = MockMeetingProvider::new().create_meeting(&request).await.unwrap();

        assert!(link.mock);
        assert!(link.meeting_url.starts_with("https://meet.google.com/"));
        assert_eq!(link.meeting_url.len(), "https://meet.google.com/".len() + 12);
    }
}
