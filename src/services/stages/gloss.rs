use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{elapsed_ms, run_model, Backend, Inference, InferenceError, Stage, StandInProfile};
use crate::models::stage::{BackendKind, PoseSequence, StageKind, StageResult};

/// Glosses the stand-in generator picks from.
pub const STAND_IN_GLOSSES: &[&str] = &[
    "CASA TECHO GATO ESTAR-AHÍ",
    "PERSONA CORRER RÁPIDO",
    "NIÑO JUGAR PELOTA PARQUE",
    "MUJER COMPRAR PAN PANADERÍA",
    "HOMBRE TRABAJAR OFICINA COMPUTADORA",
];

/// Sequence model turning pose keypoints into a gloss string.
pub trait GlossModel: Send + Sync + 'static {
    fn generate(&self, pose: &PoseSequence) -> Result<Inference<String>, InferenceError>;
}

/// Second stage: keypoints → gloss (e.g. `CASA TECHO GATO ESTAR-AHÍ`).
#[derive(Debug, Clone)]
pub struct GlossGenerator {
    backend: Backend<dyn GlossModel>,
    timeout: Duration,
}

impl GlossGenerator {
    pub fn new(backend: Backend<dyn GlossModel>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl Stage for GlossGenerator {
    type Input = PoseSequence;
    type Output = String;

    const KIND: StageKind = StageKind::Gloss;

    async fn run(&self, pose: &PoseSequence) -> StageResult<String> {
        if pose.keypoints.is_empty() {
            return StageResult::failed("no keypoints to interpret", 0.0, self.backend.kind());
        }

        match &self.backend {
            Backend::Model(model) => {
                let model = Arc::clone(model);
                let pose = pose.clone();
                run_model(self.timeout, move || model.generate(&pose)).await
            }
            Backend::StandIn(profile) => stand_in_gloss(profile).await,
        }
    }
}

async fn stand_in_gloss(profile: &StandInProfile) -> StageResult<String> {
    let start = Instant::now();
    let (gloss, confidence, timing_ms) = {
        let mut rng = profile.rng();
        let gloss = match &profile.fixed_gloss {
            Some(fixed) => fixed.clone(),
            None => STAND_IN_GLOSSES
                .choose(&mut rng)
                .copied()
                .unwrap_or(STAND_IN_GLOSSES[0])
                .to_string(),
        };
        (gloss, rng.gen_range(0.80..0.95), rng.gen_range(800.0..2000.0))
    };
    profile.pause(timing_ms).await;

    if gloss.trim().is_empty() {
        return StageResult::failed("generated gloss is empty", elapsed_ms(start), BackendKind::StandIn);
    }
    StageResult::succeeded(gloss, confidence, timing_ms, BackendKind::StandIn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose() -> PoseSequence {
        PoseSequence {
            keypoints: vec![vec![0.1; PoseSequence::VALUES_PER_FRAME]; 3],
            frames_processed: 3,
            total_frames: 3,
        }
    }

    struct BrokenModel;

    impl GlossModel for BrokenModel {
        fn generate(&self, _pose: &PoseSequence) -> Result<Inference<String>, InferenceError> {
            Err(InferenceError("tensor shape mismatch".to_string()))
        }
    }

    #[tokio::test]
    async fn test_stand_in_picks_known_gloss() {
        let stage = GlossGenerator::new(Backend::StandIn(StandInProfile::default()), Duration::from_secs(5));
        let result = stage.run(&pose()).await;
        assert!(result.success);
        assert!(STAND_IN_GLOSSES.contains(&result.payload().unwrap().as_str()));
        assert!((0.80..0.95).contains(&result.confidence));
        assert!((800.0..2000.0).contains(&result.timing_ms));
    }

    #[tokio::test]
    async fn test_fixed_gloss() {
        let profile = StandInProfile {
            fixed_gloss: Some("PERSONA CORRER RÁPIDO".to_string()),
            ..StandInProfile::default()
        };
        let stage = GlossGenerator::new(Backend::StandIn(profile), Duration::from_secs(5));
        let result = stage.run(&pose()).await;
        assert_eq!(result.payload().unwrap(), "PERSONA CORRER RÁPIDO");
    }

    #[tokio::test]
    async fn test_empty_keypoints_fail() {
        let stage = GlossGenerator::new(Backend::StandIn(StandInProfile::default()), Duration::from_secs(5));
        let result = stage.run(&PoseSequence::default()).await;
        assert!(!result.success);
        assert!(result.payload().is_none());
    }

    #[tokio::test]
    async fn test_model_error_is_normalized() {
        let stage = GlossGenerator::new(Backend::Model(Arc::new(BrokenModel)), Duration::from_secs(5));
        let result = stage.run(&pose()).await;
        assert!(!result.success);
        assert_eq!(result.failure_reason(), "tensor shape mismatch");
        assert_eq!(result.backend, BackendKind::Model);
    }
}
