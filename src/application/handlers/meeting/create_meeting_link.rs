//! CreateMeetingLinkHandler - Creates a video meeting for a scheduled session.
//!
//! With `allow_mock_fallback` set (development only), a missing or failing
//! provider yields a mock link instead of an error.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ports::{MeetingError, MeetingLink, MeetingProvider, MeetingRequest};

#[derive(Debug, Clone)]
pub struct CreateMeetingLinkCommand {
    pub request: MeetingRequest,
}

pub struct CreateMeetingLinkHandler {
    provider: Option<Arc<dyn MeetingProvider>>,
    fallback: Option<Arc<dyn MeetingProvider>>,
}

impl CreateMeetingLinkHandler {
    /// `provider` is `None` when no credentials are configured.
    pub fn new(provider: Option<Arc<dyn MeetingProvider>>) -> Self {
        Self {
            provider,
            fallback: None,
        }
    }

    /// Provider used when the real one is missing or fails.
    pub fn with_fallback(mut self, fallback: Arc<dyn MeetingProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub async fn handle(&self, cmd: CreateMeetingLinkCommand) -> Result<MeetingLink, MeetingError> {
        let request = cmd.request;
        request.validate()?;

        let result = match &self.provider {
            Some(provider) => provider.create_meeting(&request).await,
            None => Err(MeetingError::NotConfigured),
        };

        match (result, &self.fallback) {
            (Ok(link), _) => {
                info!(
                    calendar_event_id = ?link.calendar_event_id,
                    attendees = request.attendees.len(),
                    "Meeting link created"
                );
                Ok(link)
            }
            (Err(MeetingError::InvalidRequest(msg)), _) => Err(MeetingError::InvalidRequest(msg)),
            (Err(e), Some(fallback)) => {
                warn!(error = %e, "Meeting provider unavailable, using mock link");
                fallback.create_meeting(&request).await
            }
            (Err(e), None) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::google::MockMeetingProvider;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    struct FailingProvider;

    #[async_trait]
    impl MeetingProvider for FailingProvider {
        async fn create_meeting(&self, _: &MeetingRequest) -> Result<MeetingLink, MeetingError> {
            Err(MeetingError::Provider("calendar returned 503".to_string()))
        }
    }

    struct FixedProvider;

    #[async_trait]
    impl MeetingProvider for FixedProvider {
        async fn create_meeting(&self, _: &MeetingRequest) -> Result<MeetingLink, MeetingError> {
            Ok(MeetingLink {
                meeting_url: "https://meet.google.com/abc-defg-hij".to_string(),
                calendar_event_id: Some("evt-1".to_string()),
                mock: false,
            })
        }
    }

    fn command() -> CreateMeetingLinkCommand {
        let start = Utc::now() + Duration::days(1);
        CreateMeetingLinkCommand {
            request: MeetingRequest {
                title: "Viewing".to_string(),
                description: Some("Unit 4B".to_string()),
                start,
                end: start + Duration::minutes(45),
                attendees: vec!["guest@example.com".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn provider_link_is_returned() {
        let handler = CreateMeetingLinkHandler::new(Some(Arc::new(FixedProvider)))
            .with_fallback(Arc::new(MockMeetingProvider::new()));

        let link = handler.handle(command()).await.unwrap();

        assert!(!link.mock);
        assert_eq!(link.calendar_event_id.as_deref(), Some("evt-1"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_when_allowed() {
        let handler = CreateMeetingLinkHandler::new(Some(Arc::new(FailingProvider)))
            .with_fallback(Arc::new(MockMeetingProvider::new()));

        let link = handler.handle(command()).await.unwrap();

        assert!(link.mock);
    }

    #[tokio::test]
    async fn provider_failure_surfaces_without_fallback() {
        let handler = CreateMeetingLinkHandler::new(Some(Arc::new(FailingProvider)));

        let err = handler.handle(command()).await.unwrap_err();

        assert!(matches!(err, MeetingError::Provider(_)));
    }

    #[tokio::test]
    async fn missing_provider_is_not_configured() {
        let err = CreateMeetingLinkHandler::new(None)
            .handle(command())
            .await
            .unwrap_err();

        assert_eq!(err, MeetingError::NotConfigured);
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_fallback() {
        let handler =
            CreateMeetingLinkHandler::new(None).with_fallback(Arc::new(MockMeetingProvider::new()));
        let mut cmd = command();
        cmd.request.end = cmd.request.start;

        let err = handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, MeetingError::InvalidRequest(_)));
    }
}
