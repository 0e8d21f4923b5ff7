use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

/// Runs `detector` on `frame` and returns the first reported face, cropped.
///
/// Regions are not ranked: the first one the classifier reports wins.
/// When nothing is found (or the first region lies outside the frame)
/// the original frame comes back unchanged.
pub fn crop_first_face(
    detector: &mut dyn FaceDetector,
    frame: Frame,
) -> Result<Frame, Box<dyn std::error::Error>> {
    let regions = detector.detect(&frame)?;
    match regions.first().and_then(|region| frame.crop(region)) {
        Some(face) => Ok(face),
        None => Ok(frame),
    }
}
