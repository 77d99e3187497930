use std::sync::Arc;

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    Router,
};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::audio::clip::ArtifactFile;
use crate::AppContext;

pub mod process;
pub mod system;
pub mod tasks;


pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = super::cors_layer(&ctx.config.cors_origins);

    Router::new()
        .merge(tasks::task_router(ctx.clone()))
        .merge(process::process_router(ctx.clone()))
        .merge(system::system_router(ctx))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Streams an opened artifact as a download.
pub(crate) fn file_response(artifact: ArtifactFile) -> Response {
    let headers = [
        (header::CONTENT_TYPE, artifact.format.media_type().to_string()),
        (header::CONTENT_LENGTH, artifact.len.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        ),
    ];
    let body = Body::from_stream(ReaderStream::new(artifact.file));
    (headers, body).into_response()
}
