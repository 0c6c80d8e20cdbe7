use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{JobRecord, JobStatus, JobStatusView, JobUpdate};
use crate::models::stage::PipelineResult;

/// Process-wide registry of pipeline jobs.
///
/// Records are independent; each one is only ever mutated while holding its
/// shard lock, so concurrent status queries always observe a whole update.
/// Terminal records are write-once.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<Uuid, JobRecord>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending job and return its id.
    pub fn create(&self, video_filename: &str) -> Uuid {
        let record = JobRecord::new(video_filename);
        let job_id = record.job_id;
        self.jobs.insert(job_id, record);
        tracing::debug!(job_id = %job_id, video_filename, "Job created");
        job_id
    }

    /// Snapshot of a job record.
    pub fn get(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.get(&job_id).map(|job| job.clone())
    }

    /// Merge `update` into a non-terminal record.
    pub fn update(&self, job_id: Uuid, update: JobUpdate) -> Result<(), StoreError> {
        let mut job = self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(StoreError::Terminal(job_id, job.status));
        }
        job.apply(update);
        Ok(())
    }

    /// Move a pending job to processing. Only one caller can win the claim.
    pub fn claim(&self, job_id: Uuid) -> Result<(), StoreError> {
        let mut job = self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        match job.status {
            JobStatus::Pending => {
                job.apply(JobUpdate::new().status(JobStatus::Processing).step("starting"));
                Ok(())
            }
            JobStatus::Processing => Err(StoreError::AlreadyStarted(job_id)),
            status => Err(StoreError::Terminal(job_id, status)),
        }
    }

    /// Ask a job to stop at its next stage boundary.
    ///
    /// A job that never started is finished right away. Returns the status
    /// after the request was recorded.
    pub fn request_cancel(&self, job_id: Uuid) -> Result<JobStatus, StoreError> {
        let mut job = self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        match job.status {
            JobStatus::Pending => {
                job.cancel_requested = true;
                job.apply(
                    JobUpdate::new()
                        .status(JobStatus::Error)
                        .step("cancelled")
                        .error("job cancelled before it started"),
                );
                Ok(JobStatus::Error)
            }
            JobStatus::Processing => {
                job.cancel_requested = true;
                Ok(JobStatus::Processing)
            }
            status => Err(StoreError::Terminal(job_id, status)),
        }
    }

    pub fn is_cancel_requested(&self, job_id: Uuid) -> bool {
        self.jobs
            .get(&job_id)
            .map(|job| job.cancel_requested)
            .unwrap_or(false)
    }

    /// Status view for callers; unknown ids get the `not_found` view.
    pub fn status(&self, job_id: Uuid) -> JobStatusView {
        self.jobs
            .get(&job_id)
            .map(|job| JobStatusView::from(&*job))
            .unwrap_or_else(|| JobStatusView::not_found(job_id))
    }

    /// Final result of a completed job.
    pub fn result(&self, job_id: Uuid) -> Result<PipelineResult, ResultUnavailable> {
        let job = self
            .jobs
            .get(&job_id)
            .ok_or(ResultUnavailable::NotFound(job_id))?;
        match (&job.status, &job.result) {
            (JobStatus::Completed, Some(result)) => Ok(result.clone()),
            (status, _) => Err(ResultUnavailable::NotComplete(job_id, *status)),
        }
    }

    /// Drop terminal jobs last touched more than `older_than` ago.
    pub fn evict_finished(&self, older_than: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(older_than) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let before = self.jobs.len();
        self.jobs
            .retain(|_, job| !(job.status.is_terminal() && job.updated_at <= cutoff));
        before.saturating_sub(self.jobs.len())
    }

    /// Ids of every tracked job, in no particular order.
    pub fn job_ids(&self) -> Vec<Uuid> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} is already {1} and can no longer change")]
    Terminal(Uuid, JobStatus),

    #[error("job {0} has already been started")]
    AlreadyStarted(Uuid),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResultUnavailable {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} not yet complete (current status: {1})")]
    NotComplete(Uuid, JobStatus),
}
