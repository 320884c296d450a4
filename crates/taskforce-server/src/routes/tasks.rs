//! Task submission and run-state endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use taskforce_core::TaskStatus;

use crate::error::AppError;
use crate::types::{CreateTaskRequest, CreateTaskResponse, TaskDetailResponse};
use crate::AppState;

/// Build the tasks router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task))
        .route("/:id", get(get_task))
}

/// Create a task and start its run in the background
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), AppError> {
    let objective = req.objective.trim();
    if objective.is_empty() {
        return Err(AppError::BadRequest("Objective must not be empty".to_string()));
    }
    let orchestrator = state.orchestrator.clone().ok_or_else(|| {
        AppError::Unavailable("No language model configured; set OPENAI_API_KEY".to_string())
    })?;

    let task_id = state.repo.create_task(objective).await?;
    tracing::info!(task_id, "Task submitted");
    // Detached: the run reports through storage and the event hub, panics included
    let _ = orchestrator.spawn(task_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            task_id,
            status: TaskStatus::Pending.to_string(),
        }),
    ))
}

/// Run state, transcript, and registered artifacts
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TaskDetailResponse>, AppError> {
    let task = state
        .repo
        .get_task(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;
    let messages = state.repo.messages(id).await?;
    let files = state.repo.artifacts(id).await?;

    Ok(Json(TaskDetailResponse::new(task, messages, files)))
}
