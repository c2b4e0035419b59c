use crate::detection::domain::safety_category::SafetyCategory;
use crate::shared::bounding_box::BoundingBox;

/// A labelled object found in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub frame_sequence: u64,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Detection {
    pub fn category(&self) -> SafetyCategory {
        SafetyCategory::classify(&self.label)
    }

    pub fn relative_size(&self) -> f64 {
        self.bbox.relative_size(self.frame_width, self.frame_height)
    }

    pub fn horizontal_position(&self) -> f64 {
        self.bbox.horizontal_position(self.frame_width)
    }
}

/// A face found in one frame together with its identity embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// L2-normalised embedding vector.
    pub embedding: Vec<f32>,
    pub frame_sequence: u64,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl FaceDetection {
    pub fn relative_size(&self) -> f64 {
        self.bbox.relative_size(self.frame_width, self.frame_height)
    }

    pub fn horizontal_position(&self) -> f64 {
        self.bbox.horizontal_position(self.frame_width)
    }
}
