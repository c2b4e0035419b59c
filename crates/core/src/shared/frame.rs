use std::time::{Duration, Instant};

use ndarray::{s, ArrayView3};

use crate::shared::bounding_box::BoundingBox;

/// A single captured camera frame: contiguous RGB bytes in row-major order.
///
/// Frames are immutable once captured. The coordinator shares them with
/// inference workers behind an `Arc` and drops them once the cycle ends or a
/// newer frame supersedes them.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Self {
        Self::captured(data, width, height, channels, sequence, Instant::now())
    }

    pub fn captured(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        sequence: u64,
        captured_at: Instant,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            sequence,
            captured_at,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time elapsed between capture and `now`. Saturates at zero.
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.captured_at)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `bbox` (clamped to the frame) into a tightly
    /// packed buffer. Returns `None` when the clamped box is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<(Vec<u8>, u32, u32)> {
        let clamped = bbox.clamped(self.width, self.height);
        let x1 = clamped.x1.floor() as usize;
        let y1 = clamped.y1.floor() as usize;
        let x2 = clamped.x2.ceil() as usize;
        let y2 = clamped.y2.ceil() as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let view = self.as_ndarray();
        let region = view.slice(s![y1..y2, x1..x2, ..]);
        let pixels: Vec<u8> = region.iter().copied().collect();
        Some((pixels, (x2 - x1) as u32, (y2 - y1) as u32))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.sequence(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10]; // wrong size for 2x2x3
        Frame::new(data, 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        // 2x2 RGB: set pixel (row=1, col=0) to red
        let mut data = vec![0u8; 12];
        data[6] = 255;
        let frame = Frame::new(data, 2, 2, 3, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 2, 3]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_age_is_measured_from_capture() {
        let start = Instant::now();
        let frame = Frame::captured(vec![0u8; 3], 1, 1, 3, 0, start);
        assert_eq!(
            frame.age_at(start + Duration::from_millis(40)),
            Duration::from_millis(40)
        );
        assert_eq!(frame.age_at(start), Duration::ZERO);
    }

    #[test]
    fn test_crop_copies_inner_pixels() {
        // 4x2 frame, pixel value encodes column index
        let mut data = Vec::new();
        for _row in 0..2 {
            for col in 0..4u8 {
                data.extend_from_slice(&[col, col, col]);
            }
        }
        let frame = Frame::new(data, 4, 2, 3, 0);

        let (pixels, w, h) = frame.crop(&BoundingBox::new(1.0, 0.0, 3.0, 2.0)).unwrap();

        assert_eq!((w, h), (2, 2));
        assert_eq!(pixels.len(), 2 * 2 * 3);
        assert_eq!(pixels[0], 1);
        assert_eq!(pixels[3], 2);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = Frame::new(vec![7u8; 10 * 10 * 3], 10, 10, 3, 0);
        let (_, w, h) = frame
            .crop(&BoundingBox::new(-5.0, -5.0, 4.0, 20.0))
            .unwrap();
        assert_eq!((w, h), (4, 10));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = Frame::new(vec![0u8; 10 * 10 * 3], 10, 10, 3, 0);
        assert!(frame
            .crop(&BoundingBox::new(20.0, 20.0, 30.0, 30.0))
            .is_none());
    }
}
