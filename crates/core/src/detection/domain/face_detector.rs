use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for face detection.
///
/// Returns regions in the order the underlying classifier reports them.
/// An empty list is a normal result, not an error. Takes `&mut self`
/// because inference sessions need mutable access.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}
