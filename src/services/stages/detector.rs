use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{elapsed_ms, run_model, Backend, Inference, InferenceError, Stage, StandInProfile};
use crate::models::stage::{BackendKind, PoseSequence, StageKind, StageResult};
use crate::models::video::VideoRef;

const STAND_IN_FRAMES: usize = 300;

/// Pose estimation model: extracts body keypoints from every frame of a video.
pub trait PoseModel: Send + Sync + 'static {
    fn detect(&self, video: &Path) -> Result<Inference<PoseSequence>, InferenceError>;
}

/// First stage: video → per-frame pose keypoints.
#[derive(Debug, Clone)]
pub struct Detector {
    backend: Backend<dyn PoseModel>,
    timeout: Duration,
}

impl Detector {
    pub fn new(backend: Backend<dyn PoseModel>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl Stage for Detector {
    type Input = VideoRef;
    type Output = PoseSequence;

    const KIND: StageKind = StageKind::Detection;

    async fn run(&self, video: &VideoRef) -> StageResult<PoseSequence> {
        let start = Instant::now();
        if let Err(reason) = probe_video(&video.path).await {
            return StageResult::failed(reason, elapsed_ms(start), self.backend.kind());
        }

        match &self.backend {
            Backend::Model(model) => {
                let model = Arc::clone(model);
                let path = video.path.clone();
                run_model(self.timeout, move || model.detect(&path)).await
            }
            Backend::StandIn(profile) => stand_in_detection(profile).await,
        }
    }
}

/// Check the video reference before any work is spent on it.
async fn probe_video(path: &Path) -> Result<(), String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("video not readable at {}: {e}", path.display()))?;
    if !metadata.is_file() {
        return Err(format!("video reference {} is not a file", path.display()));
    }
    if metadata.len() == 0 {
        return Err("corrupt file: empty video".to_string());
    }
    Ok(())
}

async fn stand_in_detection(profile: &StandInProfile) -> StageResult<PoseSequence> {
    let (keypoints, confidence, timing_ms) = {
        let mut rng = profile.rng();
        let keypoints: Vec<Vec<f32>> = (0..STAND_IN_FRAMES)
            .map(|_| {
                (0..PoseSequence::VALUES_PER_FRAME)
                    .map(|_| rng.gen_range(0.0..1.0))
                    .collect()
            })
            .collect();
        (keypoints, rng.gen_range(0.85..0.98), rng.gen_range(1500.0..3000.0))
    };
    profile.pause(timing_ms).await;

    let frames = STAND_IN_FRAMES as u32;
    StageResult::succeeded(
        PoseSequence {
            keypoints,
            frames_processed: frames,
            total_frames: frames,
        },
        confidence,
        timing_ms,
        BackendKind::StandIn,
    )
}
