use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for general object detection.
///
/// Implementations own their model handle and may keep per-frame scratch
/// buffers, hence `&mut self`.
pub trait ObjectDetector: Send {
    fn detect_objects(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
