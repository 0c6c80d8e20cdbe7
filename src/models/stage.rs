use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// The three ordered pipeline stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageKind {
    Detection,
    Gloss,
    Translation,
}

impl StageKind {
    /// Label stored in `current_step` while the stage runs.
    pub fn step_label(self) -> &'static str {
        match self {
            StageKind::Detection => "detecting",
            StageKind::Gloss => "generating",
            StageKind::Translation => "translating",
        }
    }

    /// Progress checkpoint written right before the stage is invoked.
    pub fn start_progress(self) -> u8 {
        match self {
            StageKind::Detection => 15,
            StageKind::Gloss => 50,
            StageKind::Translation => 80,
        }
    }

    /// Progress checkpoint written once the stage reports success.
    pub fn done_progress(self) -> u8 {
        match self {
            StageKind::Detection => 40,
            StageKind::Gloss => 70,
            StageKind::Translation => 95,
        }
    }
}

/// Which backend produced a stage result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    Model,
    StandIn,
}

/// Uniform envelope returned by every stage invocation.
///
/// `payload` is present iff `success`; `error` is present iff not. Use the
/// [`StageResult::succeeded`] and [`StageResult::failed`] constructors so the
/// pairing always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    pub confidence: f64,
    pub timing_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub backend: BackendKind,
}

impl<T> StageResult<T> {
    pub fn succeeded(payload: T, confidence: f64, timing_ms: f64, backend: BackendKind) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            success: true,
            payload: Some(payload),
            confidence,
            timing_ms: timing_ms.max(0.0),
            error: None,
            backend,
        }
    }

    pub fn failed(error: impl Into<String>, timing_ms: f64, backend: BackendKind) -> Self {
        Self {
            success: false,
            payload: None,
            confidence: 0.0,
            timing_ms: timing_ms.max(0.0),
            error: Some(error.into()),
            backend,
        }
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// Failure reason, with a fallback for a malformed envelope.
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "stage reported failure without a reason".to_string())
    }
}

/// Per-frame body keypoints: 33 landmarks × (x, y, z).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PoseSequence {
    pub keypoints: Vec<Vec<f32>>,
    pub frames_processed: u32,
    pub total_frames: u32,
}

impl PoseSequence {
    pub const LANDMARKS: usize = 33;
    pub const VALUES_PER_FRAME: usize = Self::LANDMARKS * 3;

    pub fn frame_count(&self) -> usize {
        self.keypoints.len()
    }
}

/// Results of the stages that have completed so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StageResults {
    pub detection: Option<StageResult<PoseSequence>>,
    pub gloss: Option<StageResult<String>>,
    pub translation: Option<StageResult<String>>,
}

/// A single successful stage result headed for [`StageResults`].
#[derive(Debug, Clone)]
pub enum StageRecord {
    Detection(StageResult<PoseSequence>),
    Gloss(StageResult<String>),
    Translation(StageResult<String>),
}

impl StageResults {
    pub fn record(&mut self, record: StageRecord) {
        match record {
            StageRecord::Detection(r) => self.detection = Some(r),
            StageRecord::Gloss(r) => self.gloss = Some(r),
            StageRecord::Translation(r) => self.translation = Some(r),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.detection.is_some() && self.gloss.is_some() && self.translation.is_some()
    }
}

/// Composite result of a fully successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub job_id: Uuid,
    pub detection: StageResult<PoseSequence>,
    pub gloss: StageResult<String>,
    pub translation: StageResult<String>,
    /// End-to-end wall clock across all three stages.
    pub total_processing_time_ms: f64,
    pub final_gloss: String,
    pub final_translation: String,
}
