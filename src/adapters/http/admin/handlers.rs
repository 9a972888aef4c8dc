//! Admin endpoints.

use axum::extract::{Json, Path, Query, State};
use axum::response::IntoResponse;
use serde::Serialize;
use uuid::Uuid;

use crate::adapters::http::{ApiError, SyncAppState};
use crate::application::handlers::dead_letters::{
    DeadLetterView, ListDeadLettersQuery, ReplayDeadLetterCommand, ResolveDeadLetterCommand,
    ResolveDeadLetterRequest,
};
use crate::application::handlers::reconcile::ReconcileDocumentsCommand;
use crate::domain::foundation::DeadLetterId;

#[derive(Debug, Serialize)]
pub struct DeadLetterListResponse {
    pub dead_letters: Vec<DeadLetterView>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ResolvedResponse {
    pub id: String,
    pub resolved: bool,
}

/// POST /api/admin/reconcile?dry_run=true
pub async fn reconcile_documents(
    State(state): State<SyncAppState>,
    Query(cmd): Query<ReconcileDocumentsCommand>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.reconcile_handler().handle(cmd).await?;
    Ok(Json(report))
}

/// GET /api/admin/dead-letters?limit=50
pub async fn list_dead_letters(
    State(state): State<SyncAppState>,
    Query(query): Query<ListDeadLettersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let dead_letters = state.list_dead_letters_handler().handle(query).await?;
    Ok(Json(DeadLetterListResponse {
        count: dead_letters.len(),
        dead_letters,
    }))
}

/// POST /api/admin/dead-letters/:id/replay
pub async fn replay_dead_letter(
    State(state): State<SyncAppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = ReplayDeadLetterCommand {
        id: DeadLetterId::from_uuid(id),
    };
    let result = state.replay_dead_letter_handler().handle(cmd).await?;
    Ok(Json(result))
}

/// POST /api/admin/dead-letters/:id/resolve
pub async fn resolve_dead_letter(
    State(state): State<SyncAppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveDeadLetterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = DeadLetterId::from_uuid(id);
    state
        .resolve_dead_letter_handler()
        .handle(ResolveDeadLetterCommand {
            id,
            resolution: request.resolution,
        })
        .await?;
    Ok(Json(ResolvedResponse {
        id: id.to_string(),
        resolved: true,
    }))
}
