use crate::shared::frame::Frame;

/// Error type for anything produced on the capture thread.
pub type CaptureError = Box<dyn std::error::Error + Send + Sync>;

/// What an opened device reports about its stream.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// A camera (or anything camera-like) that delivers frames on demand.
///
/// Implementations handle the driver/codec details; the pipeline only
/// sees whole [`Frame`]s. `read_frame` blocks until the next frame is
/// available, so its latency is bounded by the device frame rate.
pub trait CaptureDevice: Send {
    fn open(&mut self) -> Result<DeviceInfo, CaptureError>;

    /// Any error is unrecoverable for the current session.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the device. Callers go through `FrameSource`, which
    /// guarantees this runs at most once per successful `open`.
    fn close(&mut self);
}
