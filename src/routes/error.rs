use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::job_store::{ResultUnavailable, StoreError};
use crate::services::pipeline::PipelineError;

/// Error returned by route handlers, rendered as `{"success": false, "detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// The job exists but has not produced a result yet.
    #[error("{0}")]
    NotReady(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Multipart failures keep the status axum assigns them, so a body cut
    /// off by the size limit is reported as 413 rather than a parse error.
    pub fn multipart(context: &str, err: MultipartError) -> Self {
        let detail = format!("{context}: {err}");
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(detail),
            _ => ApiError::BadRequest(detail),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotReady(_) => StatusCode::ACCEPTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = serde_json::json!({
            "success": false,
            "detail": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PipelineError::AlreadyTerminal(..) | PipelineError::AlreadyStarted(_) => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Terminal(..) | StoreError::AlreadyStarted(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<ResultUnavailable> for ApiError {
    fn from(err: ResultUnavailable) -> Self {
        match err {
            ResultUnavailable::NotFound(_) => ApiError::NotFound(err.to_string()),
            ResultUnavailable::NotComplete(..) => ApiError::NotReady(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("storage error: {err}"))
    }
}
