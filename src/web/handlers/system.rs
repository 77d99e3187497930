use std::sync::Arc;

use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::schedule::SweepStats;
use crate::web::ApiError;
use crate::AppContext;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn system_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/cleanup", post(manual_cleanup))
        .route("/stats", get(get_stats))
        .with_state(ctx)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    #[serde(flatten)]
    pub stats: SweepStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub active_tasks: usize,
    pub stored_directories: usize,
    pub total_storage_mb: f64,
    pub queue_size: usize,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "Audio Clip API".to_string(),
    })
}

// Run one sweep right now
async fn manual_cleanup(State(ctx): State<Arc<AppContext>>) -> Result<Json<CleanupResponse>, ApiError> {
    let stats = ctx.sweeper.sweep().await.map_err(|e| {
        error!("Manual cleanup failed: {:#}", e);
        ApiError::internal(format!("Cleanup failed: {}", e))
    })?;

    Ok(Json(CleanupResponse {
        message: "Cleanup completed".to_string(),
        stats,
    }))
}

async fn get_stats(State(ctx): State<Arc<AppContext>>) -> Result<Json<StatsResponse>, ApiError> {
    let usage = ctx.sweeper.storage_usage().await.map_err(|e| {
        error!("Failed to measure storage: {:#}", e);
        ApiError::internal(format!("Failed to measure storage: {}", e))
    })?;

    Ok(Json(StatsResponse {
        active_tasks: ctx.task_manager.active_tasks().await,
        stored_directories: usage.directories,
        total_storage_mb: round_mb(usage.bytes),
        queue_size: ctx.task_manager.queue_size(),
    }))
}

/// Megabytes rounded to two decimals.
fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}
