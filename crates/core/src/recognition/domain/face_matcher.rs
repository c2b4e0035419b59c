use crate::detection::domain::detection::FaceDetection;
use crate::recognition::domain::gallery::GallerySnapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionResult {
    Known { person_id: String, similarity: f64 },
    Unknown,
}

impl RecognitionResult {
    pub fn is_known(&self) -> bool {
        matches!(self, RecognitionResult::Known { .. })
    }
}

/// Identifies a detected face against a gallery snapshot.
///
/// Implementations only read the snapshot, so one matcher can serve any
/// number of threads.
pub trait FaceMatcher: Send + Sync {
    fn match_face(&self, face: &FaceDetection, gallery: &GallerySnapshot) -> RecognitionResult;
}
