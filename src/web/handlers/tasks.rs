use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::file_response;
use crate::schedule::{validate_source_url, TaskState};
use crate::web::ApiError;
use crate::AppContext;

pub fn task_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/download", post(create_download))
        .route("/api/status/:task_id", get(get_task_status))
        .route("/api/audio/:task_id", get(get_audio))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub state: TaskState,
    pub error_message: Option<String>,
}

// Queue a download task
async fn create_download(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(req) = payload?;
    let url = validate_source_url(&req.url)
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let task = ctx.task_manager.create_task(&url).await.map_err(|e| {
        error!("Failed to create task: {:#}", e);
        ApiError::internal("Failed to create task")
    })?;

    info!("Task {} queued", task.id);
    Ok(Json(DownloadResponse { task_id: task.id }))
}

// Get the current state of a task
async fn get_task_status(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task = ctx
        .task_manager
        .get_task(&task_id)
        .await
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(Json(TaskStatusResponse {
        state: task.state,
        error_message: task.error_message,
    }))
}

// Get the downloaded source audio, e.g. for waveform display
async fn get_audio(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact = ctx.clip_processor.open_source(&task_id).await?;
    Ok(file_response(artifact))
}
