//! Pre- and post-processing shared by the YOLO-family ONNX models.

use ort::session::Session;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Fallback model input resolution when the model doesn't specify dimensions.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Gray used to pad letterboxed input (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Placement of a frame inside a square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Letterbox-resize `frame` to `target_size` × `target_size`.
    ///
    /// Returns the NCHW float32 tensor (values in `[0, 1]`) and the
    /// transform needed to map boxes back.
    pub fn apply(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Self) {
        let fw = frame.width() as f64;
        let fh = frame.height() as f64;
        let target = target_size as f64;

        let scale = (target / fw).min(target / fh);
        let new_w = ((fw * scale).round() as u32).min(target_size);
        let new_h = ((fh * scale).round() as u32).min(target_size);
        let pad_x = (target_size - new_w) / 2;
        let pad_y = (target_size - new_h) / 2;

        let size = target_size as usize;
        let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE);

        let src = frame.as_ndarray();
        let src_h = frame.height() as usize;
        let src_w = frame.width() as usize;

        // Nearest-neighbour sampling into the padded region
        for y in 0..new_h as usize {
            let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
            let ty = pad_y as usize + y;
            for x in 0..new_w as usize {
                let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
                let tx = pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
                }
            }
        }

        (
            tensor,
            Self {
                scale,
                pad_x,
                pad_y,
            },
        )
    }

    /// Maps a centre/size box in model input coordinates back to frame pixels.
    pub fn to_frame(&self, cx: f64, cy: f64, w: f64, h: f64) -> BoundingBox {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        BoundingBox::new(
            (cx - w / 2.0 - px) / self.scale,
            (cy - h / 2.0 - py) / self.scale,
            (cx + w / 2.0 - px) / self.scale,
            (cy + h / 2.0 - py) / self.scale,
        )
    }
}

/// Reads the square input size from the model's NCHW input shape.
pub fn model_input_size(session: &Session) -> u32 {
    session
        .inputs()
        .first()
        .and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 {
                    Some(shape[2] as u32)
                } else {
                    None
                }
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_INPUT_SIZE)
}

/// Runs the model and returns its first output as `(shape, data)`.
pub fn run(
    session: &mut Session,
    input: ndarray::Array4<f32>,
) -> Result<(Vec<usize>, Vec<f32>), Box<dyn std::error::Error>> {
    let input_value = ort::value::Tensor::from_array(input)?;
    let outputs = session.run(ort::inputs![input_value])?;
    if outputs.len() == 0 {
        return Err("YOLO model produced no outputs".into());
    }
    let tensor = outputs[0].try_extract_array::<f32>()?;
    let shape = tensor.shape().to_vec();
    let data = tensor
        .as_slice()
        .ok_or("Cannot get tensor slice")?
        .to_vec();
    Ok((shape, data))
}

/// Row view over a YOLO output tensor.
///
/// YOLO exports either `[1, features, detections]` (transposed) or
/// `[1, detections, features]`; both are read row by row.
pub struct OutputRows<'a> {
    data: &'a [f32],
    num_dets: usize,
    num_feats: usize,
    transposed: bool,
}

impl<'a> OutputRows<'a> {
    pub fn new(shape: &[usize], data: &'a [f32]) -> Result<Self, String> {
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}"));
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if data.len() < num_dets * num_feats {
            return Err(format!(
                "YOLO output holds {} values, shape {shape:?} needs {}",
                data.len(),
                num_dets * num_feats
            ));
        }
        Ok(Self {
            data,
            num_dets,
            num_feats,
            transposed,
        })
    }

    pub fn len(&self) -> usize {
        self.num_dets
    }

    pub fn is_empty(&self) -> bool {
        self.num_dets == 0
    }

    pub fn features(&self) -> usize {
        self.num_feats
    }

    /// Copies detection `i` into `row`, reusing its allocation.
    pub fn read(&self, i: usize, row: &mut Vec<f32>) {
        row.clear();
        if self.transposed {
            row.extend((0..self.num_feats).map(|f| self.data[f * self.num_dets + i]));
        } else {
            row.extend_from_slice(&self.data[i * self.num_feats..(i + 1) * self.num_feats]);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub class_id: usize,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
///
/// With `class_aware`, only boxes of the same class suppress each other.
pub fn nms(mut candidates: Vec<Candidate>, iou_thresh: f64, class_aware: bool) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = keep.iter().any(|kept| {
            (!class_aware || kept.class_id == candidate.class_id)
                && kept.bbox.iou(&candidate.bbox) > iou_thresh
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}
