use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory uploaded videos are written to
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory terminal job records are persisted to
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Upload size limit in megabytes
    #[serde(default = "default_max_video_size_mb")]
    pub max_video_size_mb: u64,

    /// Run every stage with synthetic output instead of a registered model
    #[serde(default = "default_true")]
    pub use_stand_in_models: bool,

    /// What to do when a real model was requested but none is available
    #[serde(default)]
    pub model_fallback: ModelFallback,

    /// Fixed gloss for the stand-in generator instead of a random pick
    pub stand_in_gloss: Option<String>,

    /// Seed for reproducible stand-in output
    pub stand_in_seed: Option<u64>,

    /// Make stand-in stages sleep for the timing they report
    #[serde(default)]
    pub simulate_stage_latency: bool,

    /// Upper bound for a single model invocation
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Limit on pipelines running at once; unbounded when unset
    pub max_concurrent_jobs: Option<usize>,

    /// How long finished jobs stay queryable. Once swept, a job's status
    /// reads as `not_found`, so repeated status queries only return the same
    /// terminal view within this window.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
}

/// Policy applied when a stage is configured for a real model but none was registered.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelFallback {
    /// Degrade to stand-in output and log a warning.
    #[default]
    StandIn,
    /// Refuse to start.
    Fail,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads/videos")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("./uploads/results")
}

fn default_max_video_size_mb() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_stage_timeout_secs() -> u64 {
    120
}

fn default_job_retention_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upload_dir: default_upload_dir(),
            results_dir: default_results_dir(),
            max_video_size_mb: default_max_video_size_mb(),
            use_stand_in_models: true,
            model_fallback: ModelFallback::default(),
            stand_in_gloss: None,
            stand_in_seed: None,
            simulate_stage_latency: false,
            stage_timeout_secs: default_stage_timeout_secs(),
            max_concurrent_jobs: None,
            job_retention_secs: default_job_retention_secs(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn max_video_size_bytes(&self) -> u64 {
        self.max_video_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }
}
