/// COCO-80 YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, per-category confidence
/// gating and class-aware NMS.
use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::domain::safety_category::SafetyCategory;
use crate::shared::constants::COCO_LABELS;
use crate::shared::frame::Frame;

use super::execution_provider;
use super::yolo::{self, Candidate, Letterbox, OutputRows};

/// Default score floor for labels without a category-specific minimum.
pub const DEFAULT_CONFIDENCE: f64 = 0.45;

/// Different classes may overlap (a person on a chair), so NMS only
/// compares boxes of the same class.
const NMS_IOU_THRESH: f64 = 0.3;

/// Boxes narrower or shorter than this (frame pixels) are noise.
const MIN_BOX_SIDE: f64 = 15.0;

const MAX_DETECTIONS: usize = 20;

pub struct OnnxYoloObjectDetector {
    session: ort::session::Session,
    input_size: u32,
    floor: f64,
}

impl OnnxYoloObjectDetector {
    /// Load a COCO YOLO ONNX model.
    ///
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW), falling back to 640 for dynamic shapes.
    pub fn new(
        model_path: &Path,
        floor: f64,
        models_loaded: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = execution_provider::load_session(model_path, models_loaded)?;
        let input_size = yolo::model_input_size(&session);
        log::info!("Object detector ready ({input_size}px input)");
        Ok(Self {
            session,
            input_size,
            floor,
        })
    }
}

impl ObjectDetector for OnnxYoloObjectDetector {
    fn detect_objects(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let (input, letterbox) = Letterbox::apply(frame, self.input_size);
        let (shape, data) = yolo::run(&mut self.session, input)?;
        let rows = OutputRows::new(&shape, &data)?;

        let candidates = parse_candidates(&rows, &letterbox, frame, self.floor);
        let kept = nms_and_limit(candidates);

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                label: COCO_LABELS[c.class_id].to_string(),
                class_id: c.class_id,
                confidence: c.confidence,
                bbox: c.bbox,
                frame_sequence: frame.sequence(),
                frame_width: frame.width(),
                frame_height: frame.height(),
            })
            .collect())
    }
}

/// Row format: `[cx, cy, w, h, score_0, ..., score_79]`.
fn parse_candidates(
    rows: &OutputRows<'_>,
    letterbox: &Letterbox,
    frame: &Frame,
    floor: f64,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut row = Vec::with_capacity(rows.features());
    for i in 0..rows.len() {
        rows.read(i, &mut row);
        if row.len() < 5 {
            continue;
        }
        let Some((class_id, score)) = best_class(&row[4..]) else {
            continue;
        };
        let confidence = score as f64;
        let category = SafetyCategory::classify(COCO_LABELS[class_id]);
        if confidence < category.min_confidence(floor) {
            continue;
        }

        let bbox = letterbox
            .to_frame(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64)
            .clamped(frame.width(), frame.height());
        if bbox.width() < MIN_BOX_SIDE || bbox.height() < MIN_BOX_SIDE {
            continue;
        }

        candidates.push(Candidate {
            bbox,
            confidence,
            class_id,
        });
    }
    candidates
}

/// Highest-scoring COCO class in a row's score section.
fn best_class(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .take(COCO_LABELS.len())
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn nms_and_limit(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut kept = yolo::nms(candidates, NMS_IOU_THRESH, true);
    kept.truncate(MAX_DETECTIONS);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FEATURES: usize = 4 + 80;

    /// Builds a transposed `[1, 84, n]` output from `(cx, cy, w, h, class, score)`,
    /// padded with empty rows so the layout is unambiguous.
    fn output(dets: &[(f32, f32, f32, f32, usize, f32)]) -> (Vec<usize>, Vec<f32>) {
        let n = dets.len().max(FEATURES + 16);
        let mut data = vec![0.0f32; FEATURES * n];
        for (i, &(cx, cy, w, h, class, score)) in dets.iter().enumerate() {
            data[i] = cx;
            data[n + i] = cy;
            data[2 * n + i] = w;
            data[3 * n + i] = h;
            data[(4 + class) * n + i] = score;
        }
        (vec![1, FEATURES, n], data)
    }

    fn square_frame() -> Frame {
        Frame::new(vec![0u8; 640 * 640 * 3], 640, 640, 3, 7)
    }

    fn parse(dets: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<Candidate> {
        let frame = square_frame();
        let (_, letterbox) = Letterbox::apply(&frame, 640);
        let (shape, data) = output(dets);
        let rows = OutputRows::new(&shape, &data).unwrap();
        parse_candidates(&rows, &letterbox, &frame, DEFAULT_CONFIDENCE)
    }

    #[test]
    fn test_parses_best_class_and_box() {
        // class 56 = chair
        let found = parse(&[(320.0, 320.0, 100.0, 200.0, 56, 0.9)]);

        assert_eq!(found.len(), 1);
        assert_eq!(COCO_LABELS[found[0].class_id], "chair");
        assert_relative_eq!(found[0].confidence, 0.9, epsilon = 1e-6);
        assert_relative_eq!(found[0].bbox.width(), 100.0, epsilon = 1e-6);
        assert_relative_eq!(found[0].bbox.height(), 200.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hazard_needs_higher_confidence() {
        // class 2 = car, class 56 = chair; both at 0.5
        let found = parse(&[
            (100.0, 100.0, 50.0, 50.0, 2, 0.5),
            (400.0, 400.0, 50.0, 50.0, 56, 0.5),
        ]);

        assert_eq!(found.len(), 1);
        assert_eq!(COCO_LABELS[found[0].class_id], "chair");
    }

    #[test]
    fn test_household_items_accept_weaker_scores() {
        // class 41 = cup
        let found = parse(&[(100.0, 100.0, 40.0, 40.0, 41, 0.4)]);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_tiny_boxes_are_dropped() {
        let found = parse(&[(100.0, 100.0, 10.0, 60.0, 56, 0.9)]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_boxes_are_clamped_to_frame() {
        let found = parse(&[(10.0, 10.0, 100.0, 100.0, 56, 0.9)]);
        assert_eq!(found.len(), 1);
        assert_relative_eq!(found[0].bbox.x1, 0.0);
        assert_relative_eq!(found[0].bbox.y1, 0.0);
    }

    #[test]
    fn test_limit_caps_detection_count() {
        let candidates: Vec<Candidate> = (0..30)
            .map(|i| Candidate {
                bbox: crate::shared::bounding_box::BoundingBox::new(
                    i as f64 * 30.0,
                    0.0,
                    i as f64 * 30.0 + 20.0,
                    20.0,
                ),
                confidence: 0.9,
                class_id: 0,
            })
            .collect();

        assert_eq!(nms_and_limit(candidates).len(), MAX_DETECTIONS);
    }

    #[test]
    fn test_best_class_ignores_extra_columns() {
        let mut scores = vec![0.0f32; 81];
        scores[80] = 1.0;
        scores[3] = 0.5;
        assert_eq!(best_class(&scores), Some((3, 0.5)));
    }
}
