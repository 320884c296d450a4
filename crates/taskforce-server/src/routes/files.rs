//! Deliverable downloads from a task's workspace

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};

use taskforce_core::paths;

use crate::error::AppError;
use crate::AppState;

/// Build the files router
pub fn router() -> Router<AppState> {
    Router::new().route("/download/:task_id/:filename", get(download))
}

async fn download(
    State(state): State<AppState>,
    Path((task_id, filename)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    if state.repo.get_task(task_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Task {} not found", task_id)));
    }
    let safe_name = paths::safe_file_name(&filename)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid filename '{}'", filename)))?;

    let path = paths::task_workspace(&state.workspace_dir, task_id).join(safe_name);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Err(e) => return Err(anyhow::Error::from(e).into()),
    };
    tracing::debug!(task_id, file = %safe_name, bytes = body.len(), "Serving workspace file");

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", safe_name),
            ),
        ],
        body,
    ))
}
