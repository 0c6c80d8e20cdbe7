pub mod error;
pub mod health;
pub mod metrics;
pub mod video;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Multipart framing allowance on top of the video size limit.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Build the API router. `/metrics` is mounted separately by the binary.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_video_size_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/api/upload-video", post(video::upload_video))
        .route("/api/process-video/{job_id}", post(video::process_video))
        .route("/api/status/{job_id}", get(video::get_status))
        .route("/api/result/{job_id}", get(video::get_result))
        .route("/api/cancel/{job_id}", post(video::cancel_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}

/// GET / — service index.
async fn index() -> Json<Value> {
    Json(json!({
        "message": "Sign language translation API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "endpoints": {
            "upload_video": "POST /api/upload-video",
            "process_video": "POST /api/process-video/{job_id}",
            "get_status": "GET /api/status/{job_id}",
            "get_result": "GET /api/result/{job_id}",
            "cancel": "POST /api/cancel/{job_id}",
        }
    }))
}
