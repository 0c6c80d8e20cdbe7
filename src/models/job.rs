use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::models::stage::{PipelineResult, StageRecord, StageResults};

/// Lifecycle status of a pipeline job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// A video processing job as held by the job store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub video_filename: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub stage_results: StageResults,
    pub result: Option<PipelineResult>,
    pub error: Option<String>,
    #[serde(skip)]
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub const WAITING_STEP: &'static str = "waiting";

    pub fn new(video_filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            video_filename: video_filename.into(),
            status: JobStatus::Pending,
            progress: 0,
            current_step: Self::WAITING_STEP.to_string(),
            stage_results: StageResults::default(),
            result: None,
            error: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update into the record. Progress never moves backwards.
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(step) = update.current_step {
            self.current_step = step;
        }
        if let Some(record) = update.stage {
            self.stage_results.record(record);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial set of fields merged into a [`JobRecord`] by the job store.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub current_step: Option<String>,
    pub stage: Option<StageRecord>,
    pub result: Option<PipelineResult>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn stage(mut self, record: StageRecord) -> Self {
        self.stage = Some(record);
        self
    }

    pub fn result(mut self, result: PipelineResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Status as reported to callers, including the `not_found` pseudo-state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Processing,
    Completed,
    Error,
    NotFound,
}

impl From<JobStatus> for QueryStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => QueryStatus::Pending,
            JobStatus::Processing => QueryStatus::Processing,
            JobStatus::Completed => QueryStatus::Completed,
            JobStatus::Error => QueryStatus::Error,
        }
    }
}

/// Read-only view returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: QueryStatus,
    pub progress: u8,
    pub current_step: String,
    pub result: Option<PipelineResult>,
    pub error: Option<String>,
}

impl JobStatusView {
    pub fn not_found(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: QueryStatus::NotFound,
            progress: 0,
            current_step: "unknown".to_string(),
            result: None,
            error: None,
        }
    }
}

impl From<&JobRecord> for JobStatusView {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status.into(),
            progress: job.progress,
            current_step: job.current_step.clone(),
            result: if job.status == JobStatus::Completed {
                job.result.clone()
            } else {
                None
            },
            error: if job.status == JobStatus::Error {
                job.error.clone()
            } else {
                None
            },
        }
    }
}
