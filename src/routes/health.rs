use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub stand_in_models: bool,
    pub jobs_tracked: usize,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub upload_dir: ComponentHealth,
    pub results_dir: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// GET /health — liveness.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        stand_in_models: state.config.use_stand_in_models,
        jobs_tracked: state.jobs.len(),
    })
}

/// GET /health/ready — readiness, checks that the working directories exist.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let upload_dir = check_dir(&state.config.upload_dir).await;
    let results_dir = check_dir(&state.config.results_dir).await;

    let ready = upload_dir.status == "ok" && results_dir.status == "ok";
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = ReadinessResponse {
        ready,
        timestamp: Utc::now(),
        checks: ReadinessChecks {
            upload_dir,
            results_dir,
        },
    };

    (status_code, Json(response))
}

async fn check_dir(path: &Path) -> ComponentHealth {
    let start = std::time::Instant::now();
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        _ => ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        },
    }
}
