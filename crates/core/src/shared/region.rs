/// An axis-aligned rectangle in frame pixel coordinates.
///
/// `confidence` carries the classifier score when the region came from a
/// detector; hand-built regions leave it `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: Option<f64>,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Intersection with the `frame_w x frame_h` frame, or `None` if empty.
    pub fn clamped(&self, frame_w: u32, frame_h: u32) -> Option<Region> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.x.saturating_add(self.width).min(frame_w as i32);
        let y2 = self.y.saturating_add(self.height).min(frame_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: self.confidence,
        })
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() as f64 + other.area() as f64 - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_iou_identical_regions() {
        let a = Region::new(10, 10, 100, 100);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50x100 = 5000, union 15000
        let a = Region::new(0, 0, 100, 100);
        let b = Region::new(50, 0, 100, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[rstest]
    #[case::disjoint(Region::new(100, 100, 50, 50))]
    #[case::touching_edge(Region::new(50, 0, 50, 50))]
    fn test_iou_without_overlap_is_zero(#[case] other: Region) {
        let a = Region::new(0, 0, 50, 50);
        assert_relative_eq!(a.iou(&other), 0.0);
    }

    #[rstest]
    #[case::inside(Region::new(10, 10, 20, 20), Some((10, 10, 20, 20)))]
    #[case::negative_origin(Region::new(-5, -5, 20, 20), Some((0, 0, 15, 15)))]
    #[case::past_right_edge(Region::new(90, 0, 50, 10), Some((90, 0, 10, 10)))]
    #[case::fully_outside(Region::new(150, 150, 10, 10), None)]
    #[case::zero_width(Region::new(10, 10, 0, 10), None)]
    fn test_clamped(#[case] region: Region, #[case] expected: Option<(i32, i32, i32, i32)>) {
        let clamped = region.clamped(100, 100).map(|r| (r.x, r.y, r.width, r.height));
        assert_eq!(clamped, expected);
    }

    #[test]
    fn test_clamped_keeps_confidence() {
        let r = Region::new(-1, 0, 5, 5).with_confidence(0.8);
        assert_eq!(r.clamped(10, 10).unwrap().confidence, Some(0.8));
    }

    #[test]
    fn test_area_of_degenerate_region_is_zero() {
        assert_eq!(Region::new(0, 0, -3, 4).area(), 0);
    }
}
