use garde::Validate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::job::{JobStatusView, QueryStatus};
use crate::models::stage::{PipelineResult, PoseSequence, StageResult};

/// Container formats accepted by the upload endpoint.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// A stored video handed to the detection stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoRef {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl VideoRef {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }
}

/// Metadata of an uploaded video, validated before a job is created.
#[derive(Debug, Validate)]
pub struct VideoUpload {
    #[garde(length(min = 1, max = 200), custom(accepted_video_name))]
    pub filename: String,

    #[garde(range(min = 1))]
    pub size_bytes: u64,
}

fn accepted_video_name(value: &str, _ctx: &()) -> garde::Result {
    if value.contains('/') || value.contains('\\') {
        return Err(garde::Error::new("file name must not contain path separators"));
    }
    let lower = value.to_ascii_lowercase();
    let accepted = ACCEPTED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")));
    if accepted {
        Ok(())
    } else {
        Err(garde::Error::new("only video files are accepted (mp4, mov, avi, mkv)"))
    }
}

/// Response after uploading a video.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub message: String,
    pub filename: String,
    pub file_size: u64,
}

/// Response after triggering processing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub status: QueryStatus,
    pub message: String,
    pub poll_url: String,
}

/// Response for status polling.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub view: JobStatusView,
}

/// Per-stage details included in the final result response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedResults {
    pub detection: StageResult<PoseSequence>,
    pub gloss: StageResult<String>,
    pub translation: StageResult<String>,
}

/// Final gloss and translation of a completed job.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub gloss: String,
    pub translation: String,
    pub confidence_gloss: f64,
    pub confidence_translation: f64,
    pub processing_time_ms: f64,
    pub detailed_results: DetailedResults,
}

impl From<PipelineResult> for ResultResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            success: true,
            job_id: result.job_id,
            gloss: result.final_gloss,
            translation: result.final_translation,
            confidence_gloss: result.gloss.confidence,
            confidence_translation: result.translation.confidence,
            processing_time_ms: result.total_processing_time_ms,
            detailed_results: DetailedResults {
                detection: result.detection,
                gloss: result.gloss,
                translation: result.translation,
            },
        }
    }
}

/// Response after requesting cancellation.
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub status: QueryStatus,
    pub message: String,
}
