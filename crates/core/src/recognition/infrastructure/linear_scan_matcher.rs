use crate::detection::domain::detection::FaceDetection;
use crate::detection::infrastructure::math::cosine_similarity;
use crate::recognition::domain::face_matcher::{FaceMatcher, RecognitionResult};
use crate::recognition::domain::gallery::{GalleryEntry, GallerySnapshot};

pub const DEFAULT_THRESHOLD: f64 = 0.75;
pub const DEFAULT_TIE_EPSILON: f64 = 1e-3;

/// Compares a face against every reference embedding in the gallery.
///
/// An entry scores its best reference. Entries scoring within
/// `tie_epsilon` of the overall best, and themselves at or above the
/// threshold, are ambiguous: the one with strictly more references wins,
/// otherwise the face stays unknown.
pub struct LinearScanMatcher {
    threshold: f64,
    tie_epsilon: f64,
}

impl LinearScanMatcher {
    pub fn new(threshold: f64, tie_epsilon: f64) -> Self {
        Self {
            threshold,
            tie_epsilon,
        }
    }
}

impl Default for LinearScanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_TIE_EPSILON)
    }
}

impl FaceMatcher for LinearScanMatcher {
    fn match_face(&self, face: &FaceDetection, gallery: &GallerySnapshot) -> RecognitionResult {
        let scored: Vec<(&GalleryEntry, f64)> = gallery
            .entries()
            .map(|entry| (entry, entry_score(entry, &face.embedding)))
            .collect();

        let Some(best) = scored.iter().map(|(_, s)| *s).reduce(f64::max) else {
            return RecognitionResult::Unknown;
        };
        if best < self.threshold {
            return RecognitionResult::Unknown;
        }

        let mut contenders: Vec<&(&GalleryEntry, f64)> = scored
            .iter()
            .filter(|(_, score)| *score >= self.threshold && best - score <= self.tie_epsilon)
            .collect();
        contenders.sort_by(|a, b| b.0.embeddings.len().cmp(&a.0.embeddings.len()));

        let winner = contenders[0];
        if let Some(runner_up) = contenders.get(1) {
            if runner_up.0.embeddings.len() == winner.0.embeddings.len() {
                log::debug!(
                    "Ambiguous match between {} and {} ({best:.3})",
                    winner.0.person_id,
                    runner_up.0.person_id
                );
                return RecognitionResult::Unknown;
            }
        }

        RecognitionResult::Known {
            person_id: winner.0.person_id.clone(),
            similarity: winner.1,
        }
    }
}

fn entry_score(entry: &GalleryEntry, embedding: &[f32]) -> f64 {
    entry
        .embeddings
        .iter()
        .map(|reference| cosine_similarity(reference, embedding))
        .fold(f64::NEG_INFINITY, f64::max)
}
