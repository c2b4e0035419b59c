/// Face detection plus ArcFace embedding using ONNX Runtime.
///
/// A YOLO face model locates faces; each crop is then embedded with an
/// ArcFace model. Both sessions belong to the one analyzer, so a single
/// worker thread drives them back to back.
use std::path::Path;

use crate::detection::domain::detection::FaceDetection;
use crate::detection::domain::face_analyzer::FaceAnalyzer;
use crate::shared::frame::Frame;

use super::execution_provider;
use super::math::l2_normalize;
use super::yolo::{self, Candidate, Letterbox, OutputRows};

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.45;

/// Faces smaller than this on either side cannot be embedded reliably.
const MIN_FACE_SIDE: f64 = 16.0;

const EMBED_INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxFaceAnalyzer {
    detector: ort::session::Session,
    embedder: ort::session::Session,
    input_size: u32,
    confidence: f64,
}

impl OnnxFaceAnalyzer {
    pub fn new(
        detector_path: &Path,
        embedder_path: &Path,
        confidence: f64,
        models_loaded: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = execution_provider::load_session(detector_path, models_loaded)?;
        let embedder = execution_provider::load_session(embedder_path, models_loaded)?;
        let input_size = yolo::model_input_size(&detector);
        log::info!("Face analyzer ready ({input_size}px detector input)");
        Ok(Self {
            detector,
            embedder,
            input_size,
            confidence,
        })
    }

    fn locate(&mut self, frame: &Frame) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
        let (input, letterbox) = Letterbox::apply(frame, self.input_size);
        let (shape, data) = yolo::run(&mut self.detector, input)?;
        let rows = OutputRows::new(&shape, &data)?;
        let candidates = parse_faces(&rows, &letterbox, frame, self.confidence);
        Ok(yolo::nms(candidates, NMS_IOU_THRESH, false))
    }

    fn embed(
        &mut self,
        rgb_data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess(rgb_data, width, height);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.embedder.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect_faces(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        let located = self.locate(frame)?;

        let mut faces = Vec::with_capacity(located.len());
        for candidate in located {
            let Some((crop, w, h)) = frame.crop(&candidate.bbox) else {
                continue;
            };
            let embedding = self.embed(&crop, w, h)?;
            faces.push(FaceDetection {
                bbox: candidate.bbox,
                confidence: candidate.confidence,
                embedding,
                frame_sequence: frame.sequence(),
                frame_width: frame.width(),
                frame_height: frame.height(),
            });
        }
        Ok(faces)
    }
}

/// Row format: `[cx, cy, w, h, conf, keypoints...]`; keypoints are unused.
fn parse_faces(
    rows: &OutputRows<'_>,
    letterbox: &Letterbox,
    frame: &Frame,
    confidence: f64,
) -> Vec<Candidate> {
    let mut faces = Vec::new();
    let mut row = Vec::with_capacity(rows.features());
    for i in 0..rows.len() {
        rows.read(i, &mut row);
        if row.len() < 5 {
            continue;
        }
        let conf = row[4] as f64;
        if conf < confidence {
            continue;
        }
        let bbox = letterbox
            .to_frame(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64)
            .clamped(frame.width(), frame.height());
        if bbox.width() < MIN_FACE_SIDE || bbox.height() < MIN_FACE_SIDE {
            continue;
        }
        faces.push(Candidate {
            bbox,
            confidence: conf,
            class_id: 0,
        });
    }
    faces
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;
    let size = EMBED_INPUT_SIZE;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}
