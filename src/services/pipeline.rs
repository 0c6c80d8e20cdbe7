//! Drives one job through detection, gloss generation and translation.
//!
//! Stages run strictly in order; stage N+1 only starts after stage N reported
//! success. Progress moves through fixed checkpoints
//! (15 → 40 → 50 → 70 → 80 → 95 → 100) and the first failing stage ends the job
//! in the `error` state with its progress left where it was. Cancellation is
//! only honoured between stages.

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::{JobStatus, JobUpdate};
use crate::models::stage::{PipelineResult, PoseSequence, StageKind, StageRecord, StageResult};
use crate::models::video::VideoRef;
use crate::services::job_store::{JobStore, StoreError};
use crate::services::persister::ResultPersister;
use crate::services::stages::{
    elapsed_ms, Detector, GlossGenerator, Stage, Stages, Translator,
};

const COMPLETED_STEP: &str = "completed";

/// Terminal outcome of a pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed(PipelineResult),
    Error(PipelineFailure),
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineFailure {
    pub job_id: Uuid,
    /// Stage that failed or was about to run when the job was cancelled.
    pub stage: StageKind,
    pub error: String,
    pub total_processing_time_ms: f64,
}

/// Holds one slot of the `pipeline_jobs_in_flight` gauge, released on drop
/// so an unwinding stage cannot leave it raised.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::gauge!("pipeline_jobs_in_flight").increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::gauge!("pipeline_jobs_in_flight").decrement(1.0);
    }
}

enum Step<T> {
    Done(StageResult<T>, T),
    Stopped(String),
}

/// Runs jobs against one set of stages and keeps the [`JobStore`] in sync.
pub struct PipelineOrchestrator<D = Detector, G = GlossGenerator, T = Translator> {
    store: Arc<JobStore>,
    detector: D,
    gloss: G,
    translator: T,
    persister: Option<Arc<dyn ResultPersister>>,
    limiter: Option<Arc<Semaphore>>,
}

impl PipelineOrchestrator {
    pub fn from_stages(store: Arc<JobStore>, stages: Stages) -> Self {
        Self::new(store, stages.detector, stages.gloss, stages.translator)
    }
}

impl<D, G, T> PipelineOrchestrator<D, G, T>
where
    D: Stage<Input = VideoRef, Output = PoseSequence>,
    G: Stage<Input = PoseSequence, Output = String>,
    T: Stage<Input = str, Output = String>,
{
    pub fn new(store: Arc<JobStore>, detector: D, gloss: G, translator: T) -> Self {
        Self {
            store,
            detector,
            gloss,
            translator,
            persister: None,
            limiter: None,
        }
    }

    pub fn with_persister(mut self, persister: Arc<dyn ResultPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Cap the number of pipelines running at once. Jobs over the cap wait
    /// in `processing` until a slot frees up.
    pub fn with_concurrency_limit(mut self, max_jobs: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(max_jobs.max(1))));
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Claim a pending job and run it in the background.
    ///
    /// Returns as soon as the task is spawned; the job is `processing` by then.
    pub fn start(self: &Arc<Self>, job_id: Uuid, video: VideoRef) -> Result<JoinHandle<()>, PipelineError> {
        self.store.claim(job_id)?;
        metrics::counter!("pipeline_jobs_total").increment(1);
        tracing::info!(job_id = %job_id, video = %video.path.display(), "Pipeline scheduled");

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _permit = match &this.limiter {
                Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
                None => None,
            };

            match AssertUnwindSafe(this.execute(job_id, &video)).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(job_id = %job_id, error = %e, "Pipeline rejected job"),
                Err(_) => {
                    tracing::error!(job_id = %job_id, "Pipeline task panicked");
                    this.abort(job_id, "internal error while processing the job").await;
                }
            }
        }))
    }

    /// Run all three stages for one job and record the terminal state.
    pub async fn execute(&self, job_id: Uuid, video: &VideoRef) -> Result<PipelineOutcome, PipelineError> {
        let job = self.store.get(job_id).ok_or(PipelineError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(PipelineError::AlreadyTerminal(job_id, job.status));
        }

        let in_flight = InFlight::enter();
        let started = Instant::now();
        let outcome = self.run_stages(job_id, video, started).await;
        drop(in_flight);
        let outcome = outcome?;

        metrics::histogram!("pipeline_processing_seconds").record(started.elapsed().as_secs_f64());
        match &outcome {
            PipelineOutcome::Completed(result) => {
                metrics::counter!("pipeline_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    total_ms = result.total_processing_time_ms,
                    gloss = %result.final_gloss,
                    translation = %result.final_translation,
                    "Pipeline completed"
                );
            }
            PipelineOutcome::Error(failure) => {
                metrics::counter!("pipeline_jobs_failed").increment(1);
                tracing::error!(
                    job_id = %job_id,
                    stage = %failure.stage,
                    error = %failure.error,
                    "Pipeline failed"
                );
            }
        }

        self.persist(job_id).await;
        Ok(outcome)
    }

    async fn run_stages(
        &self,
        job_id: Uuid,
        video: &VideoRef,
        started: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        let (detection, pose) = match self
            .run_stage(job_id, &self.detector, video, StageRecord::Detection)
            .await?
        {
            Step::Done(result, pose) => {
                tracing::info!(job_id = %job_id, frames = pose.frame_count(), "Detection complete");
                (result, pose)
            }
            Step::Stopped(error) => return self.fail(job_id, StageKind::Detection, error, started),
        };

        let (gloss, gloss_text) = match self
            .run_stage(job_id, &self.gloss, &pose, StageRecord::Gloss)
            .await?
        {
            Step::Done(result, text) => {
                tracing::info!(job_id = %job_id, gloss = %text, "Gloss generation complete");
                (result, text)
            }
            Step::Stopped(error) => return self.fail(job_id, StageKind::Gloss, error, started),
        };

        let (translation, translation_text) = match self
            .run_stage(job_id, &self.translator, gloss_text.as_str(), StageRecord::Translation)
            .await?
        {
            Step::Done(result, text) => {
                tracing::info!(job_id = %job_id, translation = %text, "Translation complete");
                (result, text)
            }
            Step::Stopped(error) => return self.fail(job_id, StageKind::Translation, error, started),
        };

        let result = PipelineResult {
            job_id,
            detection,
            gloss,
            translation,
            total_processing_time_ms: elapsed_ms(started),
            final_gloss: gloss_text,
            final_translation: translation_text,
        };
        self.store.update(
            job_id,
            JobUpdate::new()
                .status(JobStatus::Completed)
                .progress(100)
                .step(COMPLETED_STEP)
                .result(result.clone()),
        )?;
        Ok(PipelineOutcome::Completed(result))
    }

    async fn run_stage<S: Stage>(
        &self,
        job_id: Uuid,
        stage: &S,
        input: &S::Input,
        record: fn(StageResult<S::Output>) -> StageRecord,
    ) -> Result<Step<S::Output>, PipelineError> {
        if self.store.is_cancel_requested(job_id) {
            return Ok(Step::Stopped(format!("job cancelled before {} stage", S::KIND)));
        }

        self.store.update(
            job_id,
            JobUpdate::new()
                .status(JobStatus::Processing)
                .step(S::KIND.step_label())
                .progress(S::KIND.start_progress()),
        )?;
        tracing::info!(job_id = %job_id, stage = %S::KIND, "Running stage");

        let stage_start = Instant::now();
        let result = stage.run(input).await;
        metrics::histogram!("pipeline_stage_seconds", "stage" => S::KIND.to_string())
            .record(stage_start.elapsed().as_secs_f64());

        let payload = match result.payload() {
            Some(payload) if result.success => payload.clone(),
            _ => {
                return Ok(Step::Stopped(format!(
                    "{} stage failed: {}",
                    S::KIND,
                    result.failure_reason()
                )))
            }
        };

        tracing::debug!(
            job_id = %job_id,
            stage = %S::KIND,
            confidence = result.confidence,
            timing_ms = result.timing_ms,
            backend = %result.backend,
            "Stage succeeded"
        );
        self.store.update(
            job_id,
            JobUpdate::new()
                .stage(record(result.clone()))
                .progress(S::KIND.done_progress()),
        )?;
        Ok(Step::Done(result, payload))
    }

    fn fail(
        &self,
        job_id: Uuid,
        stage: StageKind,
        error: String,
        started: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.store.update(
            job_id,
            JobUpdate::new().status(JobStatus::Error).error(error.clone()),
        )?;
        Ok(PipelineOutcome::Error(PipelineFailure {
            job_id,
            stage,
            error,
            total_processing_time_ms: elapsed_ms(started),
        }))
    }

    /// Finish a job whose pipeline task died without reaching a terminal state.
    async fn abort(&self, job_id: Uuid, reason: &str) {
        metrics::counter!("pipeline_jobs_failed").increment(1);
        let update = JobUpdate::new().status(JobStatus::Error).error(reason);
        if let Err(e) = self.store.update(job_id, update) {
            tracing::warn!(job_id = %job_id, error = %e, "Could not mark aborted job as failed");
            return;
        }
        self.persist(job_id).await;
    }

    async fn persist(&self, job_id: Uuid) {
        let Some(persister) = &self.persister else {
            return;
        };
        let Some(record) = self.store.get(job_id) else {
            return;
        };
        if let Err(e) = persister.save(job_id, &record).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to persist job result");
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} already finished with status {1}")]
    AlreadyTerminal(Uuid, JobStatus),

    #[error("job {0} has already been started")]
    AlreadyStarted(Uuid),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            StoreError::Terminal(id, status) => PipelineError::AlreadyTerminal(id, status),
            StoreError::AlreadyStarted(id) => PipelineError::AlreadyStarted(id),
        }
    }
}
