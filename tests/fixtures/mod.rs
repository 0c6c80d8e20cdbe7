//! Shared test data for pipeline and API tests

use sign_translate::models::stage::PoseSequence;

pub const CLIP_NAME: &str = "clip.mp4";
pub const CLIP_FRAMES: usize = 300;
pub const CLIP_GLOSS: &str = "CASA TECHO GATO ESTAR-AHÍ";
pub const CLIP_TRANSLATION: &str = "El gato está en el techo de la casa";

/// A few bytes standing in for an encoded video container.
pub const FAKE_VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom";

/// Pose sequence with `frames` frames of constant keypoints.
pub fn pose_sequence(frames: usize) -> PoseSequence {
    PoseSequence {
        keypoints: vec![vec![0.5; PoseSequence::VALUES_PER_FRAME]; frames],
        frames_processed: frames as u32,
        total_frames: frames as u32,
    }
}
