use crate::detection::domain::detection::FaceDetection;
use crate::shared::frame::Frame;

/// Domain interface for locating faces and computing their embeddings in
/// one pass.
pub trait FaceAnalyzer: Send {
    fn detect_faces(&mut self, frame: &Frame)
        -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>>;
}
