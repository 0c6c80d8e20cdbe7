use axum::extract::{Multipart, Path, State};
use axum::Json;
use garde::Validate;
use std::path::PathBuf;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::models::job::{JobStatus, JobUpdate, QueryStatus};
use crate::models::video::{
    CancelResponse, ProcessResponse, ResultResponse, StatusResponse, UploadResponse, VideoRef,
    VideoUpload,
};
use crate::routes::error::ApiError;

/// Where the upload for `job_id` lives on disk.
pub fn video_path(config: &AppConfig, job_id: Uuid, filename: &str) -> PathBuf {
    config.upload_dir.join(format!("{job_id}_{filename}"))
}

/// POST /api/upload-video — store a video and create its job.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::multipart("invalid multipart body", e))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("uploaded file has no name".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::multipart("failed to read upload", e))?;
        upload = Some((filename, data));
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".to_string()))?;
    let size_bytes = data.len() as u64;

    if size_bytes > state.config.max_video_size_bytes() {
        return Err(ApiError::PayloadTooLarge(format!(
            "file too large, maximum is {}MB",
            state.config.max_video_size_mb
        )));
    }
    VideoUpload {
        filename: filename.clone(),
        size_bytes,
    }
    .validate()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let job_id = state.jobs.create(&filename);
    let path = video_path(&state.config, job_id, &filename);

    let stored = async {
        tokio::fs::create_dir_all(&state.config.upload_dir).await?;
        tokio::fs::write(&path, &data).await
    }
    .await;
    if let Err(e) = stored {
        let update = JobUpdate::new()
            .status(JobStatus::Error)
            .error("uploaded video could not be stored");
        if let Err(store_err) = state.jobs.update(job_id, update) {
            tracing::warn!(job_id = %job_id, error = %store_err, "Could not mark unstored upload as failed");
        }
        return Err(e.into());
    }

    tracing::info!(job_id = %job_id, filename = %filename, size_bytes, "Video uploaded");

    Ok(Json(UploadResponse {
        success: true,
        job_id,
        message: "Video uploaded".to_string(),
        filename,
        file_size: size_bytes,
    }))
}

/// POST /api/process-video/{job_id} — start the pipeline in the background.
pub async fn process_video(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let job = state
        .jobs
        .get(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))?;

    let path = video_path(&state.config, job_id, &job.video_filename);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::NotFound("video file not found".to_string()))?;

    state
        .pipeline
        .start(job_id, VideoRef::new(path, metadata.len()))?;

    let poll_url = format!("/api/status/{job_id}");
    Ok(Json(ProcessResponse {
        success: true,
        job_id,
        status: QueryStatus::Processing,
        message: format!("Processing started. Poll GET {poll_url} for progress."),
        poll_url,
    }))
}

/// GET /api/status/{job_id} — current progress; unknown ids report `not_found`.
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        view: state.jobs.status(job_id),
    })
}

/// GET /api/result/{job_id} — final gloss and translation.
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ResultResponse>, ApiError> {
    let result = state.jobs.result(job_id)?;
    Ok(Json(ResultResponse::from(result)))
}

/// POST /api/cancel/{job_id} — stop the job at its next stage boundary.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let status = state.jobs.request_cancel(job_id)?;
    tracing::info!(job_id = %job_id, "Cancellation requested");

    let message = match status {
        JobStatus::Error => "Job cancelled",
        _ => "Cancellation requested, the job stops before its next stage",
    };
    Ok(Json(CancelResponse {
        success: true,
        job_id,
        status: status.into(),
        message: message.to_string(),
    }))
}
