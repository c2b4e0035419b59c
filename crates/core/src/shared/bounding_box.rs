/// Axis-aligned box in frame pixel coordinates (`x1,y1` top-left,
/// `x2,y2` bottom-right).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from YOLO-style centre/size coordinates.
    pub fn from_center(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Fraction of the frame covered by this box, in `[0, 1]`.
    ///
    /// Used as a proximity proxy: the closer an object, the more of the
    /// view it fills.
    pub fn relative_size(&self, frame_width: u32, frame_height: u32) -> f64 {
        let total = frame_width as f64 * frame_height as f64;
        if total <= 0.0 {
            return 0.0;
        }
        (self.clamped(frame_width, frame_height).area() / total).clamp(0.0, 1.0)
    }

    /// Horizontal centre as a fraction of frame width (0 = far left).
    pub fn horizontal_position(&self, frame_width: u32) -> f64 {
        if frame_width == 0 {
            return 0.5;
        }
        (self.center().0 / frame_width as f64).clamp(0.0, 1.0)
    }

    pub fn clamped(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        BoundingBox {
            x1: self.x1.clamp(0.0, fw),
            y1: self.y1.clamp(0.0, fh),
            x2: self.x2.clamp(0.0, fw),
            y2: self.y2.clamp(0.0, fh),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_iou_no_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_perfect_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        assert_relative_eq!(a.iou(&b), 25.0 / 175.0);
    }

    #[test]
    fn test_from_center() {
        let b = BoundingBox::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(b, BoundingBox::new(40.0, 35.0, 60.0, 45.0));
    }

    #[test]
    fn test_relative_size_of_full_frame_is_one() {
        let b = BoundingBox::new(0.0, 0.0, 100.0, 50.0);
        assert_relative_eq!(b.relative_size(100, 50), 1.0);
    }

    #[test]
    fn test_relative_size_ignores_offscreen_area() {
        let b = BoundingBox::new(-50.0, 0.0, 50.0, 100.0);
        assert_relative_eq!(b.relative_size(100, 100), 0.5);
    }

    #[test]
    fn test_relative_size_zero_frame() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(b.relative_size(0, 0), 0.0);
    }

    #[rstest]
    #[case(0.0, 20.0, 0.1)]
    #[case(40.0, 60.0, 0.5)]
    #[case(80.0, 100.0, 0.9)]
    fn test_horizontal_position(#[case] x1: f64, #[case] x2: f64, #[case] expected: f64) {
        let b = BoundingBox::new(x1, 0.0, x2, 10.0);
        assert_relative_eq!(b.horizontal_position(100), expected);
    }

    #[test]
    fn test_inverted_box_has_zero_area() {
        let b = BoundingBox::new(10.0, 10.0, 5.0, 5.0);
        assert_eq!(b.area(), 0.0);
    }
}
