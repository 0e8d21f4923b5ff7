use crate::shared::frame::Frame;

/// Anything that can show the two images of the demo.
///
/// Called only from the dispatcher, i.e. on the thread that owns the
/// display, so implementations need not be `Send`. Calls must return
/// within a display refresh.
pub trait DisplaySurface {
    /// Shows the raw camera frame.
    fn show_primary(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Shows the detection result (face crop or the unchanged frame).
    fn show_secondary(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
}
