use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::adapters::http::{ApiError, SyncAppState};
use crate::application::handlers::meeting::CreateMeetingLinkCommand;
use crate::ports::MeetingRequest;

/// POST /api/meetings - Create a meeting link
pub async fn create_meeting(
    State(state): State<SyncAppState>,
    Json(request): Json<MeetingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let link = state
        .meetings
        .handle(CreateMeetingLinkCommand { request })
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}
