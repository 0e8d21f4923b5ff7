use crate::capture::domain::capture_device::{CaptureDevice, DeviceInfo};
use crate::pipeline::pipeline_error::PipelineError;
use crate::shared::frame::Frame;

/// Exclusive owner of a [`CaptureDevice`].
///
/// Turns device output into RGB frames and makes release idempotent:
/// the device is closed exactly once per `open`, whether through
/// [`FrameSource::close`] or on drop.
pub struct FrameSource {
    device: Box<dyn CaptureDevice>,
    info: Option<DeviceInfo>,
    frames_read: u64,
}

impl FrameSource {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            info: None,
            frames_read: 0,
        }
    }

    /// Opens the device. Opening an already-open source is a no-op.
    pub fn open(&mut self) -> Result<DeviceInfo, PipelineError> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }
        let info = self.device.open().map_err(PipelineError::DeviceOpen)?;
        log::info!(
            "Opened capture device {} ({}x{} @ {:.1} fps)",
            info.name,
            info.width,
            info.height,
            info.fps
        );
        self.frames_read = 0;
        self.info = Some(info.clone());
        Ok(info)
    }

    /// Reads the next frame and converts it to RGB.
    pub fn read_frame(&mut self) -> Result<Frame, PipelineError> {
        if self.info.is_none() {
            return Err(PipelineError::DeviceRead {
                frames: self.frames_read,
                source: "capture device is not open".into(),
            });
        }
        let frame = self
            .device
            .read_frame()
            .map_err(|source| PipelineError::DeviceRead {
                frames: self.frames_read,
                source,
            })?;
        self.frames_read += 1;
        Ok(frame.into_rgb())
    }

    /// Releases the device. Returns `true` only for the call that
    /// actually closed it.
    pub fn close(&mut self) -> bool {
        match self.info.take() {
            Some(info) => {
                self.device.close();
                log::info!(
                    "Closed capture device {} after {} frames",
                    info.name,
                    self.frames_read
                );
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.info.is_some()
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::domain::capture_device::CaptureError;
    use crate::shared::frame::ColorSpace;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Shared counters so tests can observe a device after it has been
    /// moved into a `FrameSource` or onto the capture thread.
    #[derive(Clone, Default)]
    pub(crate) struct DeviceProbe {
        pub opens: Arc<AtomicUsize>,
        pub reads: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl DeviceProbe {
        pub fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        /// Spins until the device has entered its `n`th read. The counter
        /// moves before any scripted delay, so the read is still running.
        pub fn wait_for_reads(&self, n: usize) {
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while self.reads() < n {
                assert!(std::time::Instant::now() < deadline, "device never read");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Emits 2x2 BGR frames; fails the read numbered `fail_on_read`
    /// (1-based) and every read after it.
    pub(crate) struct ScriptedDevice {
        probe: DeviceProbe,
        fail_on_read: Option<usize>,
        fail_open: bool,
        read_delay: Duration,
        sequence: u64,
    }

    impl ScriptedDevice {
        pub fn new(probe: DeviceProbe) -> Self {
            Self {
                probe,
                fail_on_read: None,
                fail_open: false,
                read_delay: Duration::ZERO,
                sequence: 0,
            }
        }

        pub fn failing_on_read(mut self, read: usize) -> Self {
            self.fail_on_read = Some(read);
            self
        }

        pub fn failing_open(mut self) -> Self {
            self.fail_open = true;
            self
        }

        pub fn with_read_delay(mut self, delay: Duration) -> Self {
            self.read_delay = delay;
            self
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn open(&mut self) -> Result<DeviceInfo, CaptureError> {
            if self.fail_open {
                return Err("no such device".into());
            }
            self.probe.opens.fetch_add(1, Ordering::SeqCst);
            self.sequence = 0;
            Ok(DeviceInfo {
                name: "scripted".into(),
                width: 2,
                height: 2,
                fps: 30.0,
            })
        }

        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            let read = self.probe.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.read_delay.is_zero() {
                std::thread::sleep(self.read_delay);
            }
            if self.fail_on_read.is_some_and(|n| read >= n) {
                return Err("device unplugged".into());
            }
            let frame = Frame::new(
                vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
                2,
                2,
                ColorSpace::Bgr,
                self.sequence,
            );
            self.sequence += 1;
            Ok(frame)
        }

        fn close(&mut self) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn open_source(probe: &DeviceProbe) -> FrameSource {
        let mut source = FrameSource::new(Box::new(ScriptedDevice::new(probe.clone())));
        source.open().unwrap();
        source
    }

    #[test]
    fn test_read_frame_converts_to_rgb() {
        let probe = DeviceProbe::default();
        let mut source = open_source(&probe);

        let frame = source.read_frame().unwrap();

        assert_eq!(frame.color_space(), ColorSpace::Rgb);
        assert_eq!(&frame.data()[..3], &[3, 2, 1]);
        assert_eq!(source.frames_read(), 1);
    }

    #[test]
    fn test_close_twice_releases_once() {
        let probe = DeviceProbe::default();
        let mut source = open_source(&probe);

        assert!(source.close());
        assert!(!source.close());
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_drop_after_close_does_not_release_again() {
        let probe = DeviceProbe::default();
        let mut source = open_source(&probe);
        source.close();
        drop(source);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_drop_releases_open_device() {
        let probe = DeviceProbe::default();
        drop(open_source(&probe));
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn test_unopened_source_never_closes_device() {
        let probe = DeviceProbe::default();
        let mut source = FrameSource::new(Box::new(ScriptedDevice::new(probe.clone())));
        assert!(!source.close());
        drop(source);
        assert_eq!(probe.closes(), 0);
    }

    #[test]
    fn test_open_failure_is_device_open_error() {
        let device = ScriptedDevice::new(DeviceProbe::default()).failing_open();
        let mut source = FrameSource::new(Box::new(device));

        let err = source.open().unwrap_err();

        assert!(matches!(err, PipelineError::DeviceOpen(_)));
        assert!(!source.is_open());
    }

    #[test]
    fn test_open_is_idempotent() {
        let probe = DeviceProbe::default();
        let mut source = open_source(&probe);
        source.open().unwrap();
        assert_eq!(probe.opens(), 1);
    }

    #[test]
    fn test_read_failure_reports_frames_before_it() {
        let probe = DeviceProbe::default();
        let device = ScriptedDevice::new(probe.clone()).failing_on_read(3);
        let mut source = FrameSource::new(Box::new(device));
        source.open().unwrap();

        source.read_frame().unwrap();
        source.read_frame().unwrap();
        let err = source.read_frame().unwrap_err();

        assert!(matches!(err, PipelineError::DeviceRead { frames: 2, .. }));
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = FrameSource::new(Box::new(ScriptedDevice::new(DeviceProbe::default())));
        assert!(matches!(
            source.read_frame(),
            Err(PipelineError::DeviceRead { frames: 0, .. })
        ));
    }

    #[test]
    fn test_reopen_after_close_releases_again() {
        let probe = DeviceProbe::default();
        let mut source = open_source(&probe);
        source.close();
        source.open().unwrap();
        source.close();
        assert_eq!(probe.opens(), 2);
        assert_eq!(probe.closes(), 2);
    }
}
