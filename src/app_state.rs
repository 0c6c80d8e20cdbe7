use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::job_store::JobStore;
use crate::services::persister::JsonFilePersister;
use crate::services::pipeline::PipelineOrchestrator;
use crate::services::stages::{ModelRegistry, StageBuildError, StageSettings, Stages};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<JobStore>,
    pub pipeline: Arc<PipelineOrchestrator>,
}

impl AppState {
    pub fn new(config: AppConfig, jobs: Arc<JobStore>, pipeline: PipelineOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            jobs,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Wire the store, stages and persister from configuration.
    pub fn from_config(config: AppConfig, models: ModelRegistry) -> Result<Self, StageBuildError> {
        let jobs = Arc::new(JobStore::new());
        let stages = Stages::build(&StageSettings::from_config(&config), models)?;

        let mut pipeline = PipelineOrchestrator::from_stages(Arc::clone(&jobs), stages)
            .with_persister(Arc::new(JsonFilePersister::new(config.results_dir.clone())));
        if let Some(max_jobs) = config.max_concurrent_jobs {
            pipeline = pipeline.with_concurrency_limit(max_jobs);
        }

        Ok(Self::new(config, jobs, pipeline))
    }
}
