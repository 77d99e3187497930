use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::file_response;
use crate::audio::ClipParams;
use crate::web::ApiError;
use crate::AppContext;

pub fn process_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/process", post(process_audio))
        .with_state(ctx)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub task_id: String,
    #[serde(flatten)]
    pub params: ClipParams,
}

// Trim, fade and denoise a ready task's audio
async fn process_audio(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let artifact = ctx.clip_processor.process(&req.task_id, &req.params).await?;
    info!("Serving {} for task {}", artifact.filename, req.task_id);
    Ok(file_response(artifact))
}
