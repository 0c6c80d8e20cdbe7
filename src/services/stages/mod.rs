//! The three pipeline stages and the contract the orchestrator drives them through.
//!
//! Every stage is a single struct whose backend is either a registered model
//! or stand-in output. Which one is used is decided by the caller through
//! [`StageSettings`], never by the stage itself. A stage never panics or
//! returns an error outward: every failure becomes a failed [`StageResult`].

pub mod detector;
pub mod gloss;
pub mod translator;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{AppConfig, ModelFallback};
use crate::models::stage::{BackendKind, StageKind, StageResult};

pub use detector::{Detector, PoseModel};
pub use gloss::{GlossGenerator, GlossModel};
pub use translator::{TranslationModel, Translator};

/// One step of the pipeline: a typed input turned into a typed output.
pub trait Stage: Send + Sync + 'static {
    type Input: ?Sized + Sync;
    type Output: Clone + Send + Sync + 'static;

    const KIND: StageKind;

    /// Run the stage once. Must finish in bounded time and report failures
    /// through the returned envelope.
    fn run(&self, input: &Self::Input) -> impl Future<Output = StageResult<Self::Output>> + Send;
}

/// Output of a single model invocation.
#[derive(Debug, Clone)]
pub struct Inference<T> {
    pub output: T,
    pub confidence: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct InferenceError(pub String);

/// Where a stage gets its output from.
pub enum Backend<M: ?Sized> {
    Model(Arc<M>),
    StandIn(StandInProfile),
}

impl<M: ?Sized> Backend<M> {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Model(_) => BackendKind::Model,
            Backend::StandIn(_) => BackendKind::StandIn,
        }
    }
}

impl<M: ?Sized> Clone for Backend<M> {
    fn clone(&self) -> Self {
        match self {
            Backend::Model(model) => Backend::Model(Arc::clone(model)),
            Backend::StandIn(profile) => Backend::StandIn(profile.clone()),
        }
    }
}

impl<M: ?Sized> fmt::Debug for Backend<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Model(_) => f.write_str("Model"),
            Backend::StandIn(profile) => f.debug_tuple("StandIn").field(profile).finish(),
        }
    }
}

/// Knobs for synthetic stage output.
#[derive(Debug, Clone, Default)]
pub struct StandInProfile {
    /// Reproducible output when set.
    pub seed: Option<u64>,
    /// Sleep for the reported timing instead of returning at once.
    pub simulate_latency: bool,
    /// Gloss returned by the stand-in generator instead of a random pick.
    pub fixed_gloss: Option<String>,
}

impl StandInProfile {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub(crate) async fn pause(&self, timing_ms: f64) {
        if self.simulate_latency {
            tokio::time::sleep(Duration::from_secs_f64(timing_ms / 1000.0)).await;
        }
    }
}

/// Caller-supplied stage selection, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub use_stand_in: bool,
    pub fallback: ModelFallback,
    pub stand_in: StandInProfile,
    pub timeout: Duration,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            use_stand_in: true,
            fallback: ModelFallback::StandIn,
            stand_in: StandInProfile::default(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl StageSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            use_stand_in: config.use_stand_in_models,
            fallback: config.model_fallback,
            stand_in: StandInProfile {
                seed: config.stand_in_seed,
                simulate_latency: config.simulate_stage_latency,
                fixed_gloss: config.stand_in_gloss.clone(),
            },
            timeout: config.stage_timeout(),
        }
    }

    /// Pick the backend for one stage.
    pub fn select<M: ?Sized>(
        &self,
        kind: StageKind,
        model: Option<Arc<M>>,
    ) -> Result<Backend<M>, StageBuildError> {
        if self.use_stand_in {
            tracing::info!(stage = %kind, "Using stand-in backend");
            return Ok(Backend::StandIn(self.stand_in.clone()));
        }
        match (model, self.fallback) {
            (Some(model), _) => {
                tracing::info!(stage = %kind, "Using registered model backend");
                Ok(Backend::Model(model))
            }
            (None, ModelFallback::StandIn) => {
                tracing::warn!(stage = %kind, "No model registered, falling back to stand-in backend");
                Ok(Backend::StandIn(self.stand_in.clone()))
            }
            (None, ModelFallback::Fail) => Err(StageBuildError::ModelUnavailable(kind)),
        }
    }
}

/// Models available to the process. Empty unless an embedder registers some.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    pub pose: Option<Arc<dyn PoseModel>>,
    pub gloss: Option<Arc<dyn GlossModel>>,
    pub translation: Option<Arc<dyn TranslationModel>>,
}

impl ModelRegistry {
    pub fn with_pose(mut self, model: Arc<dyn PoseModel>) -> Self {
        self.pose = Some(model);
        self
    }

    pub fn with_gloss(mut self, model: Arc<dyn GlossModel>) -> Self {
        self.gloss = Some(model);
        self
    }

    pub fn with_translation(mut self, model: Arc<dyn TranslationModel>) -> Self {
        self.translation = Some(model);
        self
    }
}

/// The default stage set, one of each kind.
#[derive(Debug, Clone)]
pub struct Stages {
    pub detector: Detector,
    pub gloss: GlossGenerator,
    pub translator: Translator,
}

impl Stages {
    pub fn build(settings: &StageSettings, models: ModelRegistry) -> Result<Self, StageBuildError> {
        Ok(Self {
            detector: Detector::new(
                settings.select(StageKind::Detection, models.pose)?,
                settings.timeout,
            ),
            gloss: GlossGenerator::new(
                settings.select(StageKind::Gloss, models.gloss)?,
                settings.timeout,
            ),
            translator: Translator::new(
                settings.select(StageKind::Translation, models.translation)?,
                settings.timeout,
            ),
        })
    }

    pub fn stand_in(profile: StandInProfile) -> Self {
        let timeout = StageSettings::default().timeout;
        Self {
            detector: Detector::new(Backend::StandIn(profile.clone()), timeout),
            gloss: GlossGenerator::new(Backend::StandIn(profile.clone()), timeout),
            translator: Translator::new(Backend::StandIn(profile), timeout),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageBuildError {
    #[error("no model registered for the {0} stage and fallback is disabled")]
    ModelUnavailable(StageKind),
}

/// Run a blocking model call on the blocking pool, bounded by `timeout`.
pub(crate) async fn run_model<T, F>(timeout: Duration, call: F) -> StageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<Inference<T>, InferenceError> + Send + 'static,
{
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await;
    let elapsed = elapsed_ms(start);

    match outcome {
        Ok(Ok(Ok(inference))) => {
            StageResult::succeeded(inference.output, inference.confidence, elapsed, BackendKind::Model)
        }
        Ok(Ok(Err(e))) => StageResult::failed(e.to_string(), elapsed, BackendKind::Model),
        Ok(Err(join_err)) => {
            StageResult::failed(format!("model crashed: {join_err}"), elapsed, BackendKind::Model)
        }
        // The blocking call keeps running detached; only its result is dropped.
        Err(_) => StageResult::failed(
            format!("model did not answer within {}s", timeout.as_secs_f64()),
            elapsed,
            BackendKind::Model,
        ),
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_stand_in_when_requested() {
        let settings = StageSettings::default();
        let backend = settings
            .select::<dyn PoseModel>(StageKind::Detection, None)
            .unwrap();
        assert_eq!(backend.kind(), BackendKind::StandIn);
    }

    #[test]
    fn test_select_fails_without_model_when_fallback_disabled() {
        let settings = StageSettings {
            use_stand_in: false,
            fallback: ModelFallback::Fail,
            ..StageSettings::default()
        };
        let err = settings
            .select::<dyn GlossModel>(StageKind::Gloss, None)
            .unwrap_err();
        assert!(err.to_string().contains("gloss"));
    }

    #[test]
    fn test_select_degrades_to_stand_in() {
        let settings = StageSettings {
            use_stand_in: false,
            ..StageSettings::default()
        };
        let stages = Stages::build(&settings, ModelRegistry::default()).unwrap();
        assert_eq!(stages.translator.backend_kind(), BackendKind::StandIn);
    }

    struct Uppercase;

    impl TranslationModel for Uppercase {
        fn translate(&self, gloss: &str) -> Result<Inference<String>, InferenceError> {
            Ok(Inference {
                output: gloss.to_uppercase(),
                confidence: 1.7,
            })
        }
    }

    #[test]
    fn test_registered_model_is_preferred() {
        let settings = StageSettings {
            use_stand_in: false,
            ..StageSettings::default()
        };
        let models = ModelRegistry::default().with_translation(Arc::new(Uppercase));
        let stages = Stages::build(&settings, models).unwrap();
        assert_eq!(stages.translator.backend_kind(), BackendKind::Model);
        assert_eq!(stages.detector.backend_kind(), BackendKind::StandIn);

        let result = tokio_test::block_on(stages.translator.run("hola"));
        assert!(result.success);
        assert_eq!(result.payload().map(String::as_str), Some("HOLA"));
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_run_model_timeout() {
        let result: StageResult<String> = run_model(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Inference {
                output: "late".to_string(),
                confidence: 1.0,
            })
        })
        .await;
        assert!(!result.success);
        assert!(result.failure_reason().contains("did not answer"));
    }

    #[tokio::test]
    async fn test_run_model_panic_is_contained() {
        let result: StageResult<String> =
            run_model(Duration::from_secs(5), || panic!("weights corrupted")).await;
        assert!(!result.success);
        assert!(result.failure_reason().contains("model crashed"));
    }
}
