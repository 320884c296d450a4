//! Human-in-the-loop endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use taskforce_core::storage::InteractionResponse;
use taskforce_core::ResolveOutcome;

use crate::error::AppError;
use crate::types::{PendingInteractionResponse, RespondResponse};
use crate::AppState;

/// Build the interactions router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/task/:task_id/pending", get(get_pending))
        .route("/:request_id/respond", post(respond))
}

/// The request currently blocking a task, if any
async fn get_pending(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<PendingInteractionResponse>, AppError> {
    let request = state.repo.pending_interaction(task_id).await?;
    Ok(Json(request.into()))
}

/// Answer a pending request and unblock the waiting run
async fn respond(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Json(response): Json<InteractionResponse>,
) -> Result<Json<RespondResponse>, AppError> {
    match state.broker.resolve(request_id, response).await? {
        ResolveOutcome::Unknown => Err(AppError::NotFound(format!(
            "Interaction request {} not found",
            request_id
        ))),
        ResolveOutcome::AlreadyResolved => Err(AppError::Conflict(format!(
            "Interaction request {} was already resolved",
            request_id
        ))),
        outcome => Ok(Json(RespondResponse::from_outcome(outcome))),
    }
}
