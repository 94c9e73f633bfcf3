use serde::{Deserialize, Serialize};

/// Eye openness measurements for a single camera frame.
///
/// Openness values are probabilities in `0.0..=1.0` as reported by the face
/// detector; `None` means the detector could not classify that eye.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionFaceData {
    #[serde(default)]
    pub left_eye_openness: Option<f32>,
    #[serde(default)]
    pub right_eye_openness: Option<f32>,
    #[serde(default)]
    pub face_available: bool,
}

impl VisionFaceData {
    pub fn open_eyes() -> Self {
        Self {
            left_eye_openness: Some(0.95),
            right_eye_openness: Some(0.95),
            face_available: true,
        }
    }

    pub fn closed_eyes() -> Self {
        Self {
            left_eye_openness: Some(0.05),
            right_eye_openness: Some(0.05),
            face_available: true,
        }
    }

    pub fn no_face() -> Self {
        Self::default()
    }

    /// Both eyes reported and both below `threshold`. Missing values never count.
    pub fn eyes_closed(&self, threshold: f32) -> bool {
        matches!(
            (self.left_eye_openness, self.right_eye_openness),
            (Some(left), Some(right)) if left < threshold && right < threshold
        )
    }
}
