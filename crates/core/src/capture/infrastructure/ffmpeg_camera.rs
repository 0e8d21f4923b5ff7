use crate::capture::domain::capture_device::{CaptureDevice, CaptureError, DeviceInfo};
use crate::shared::frame::{ColorSpace, Frame};

/// Where and how to open a camera through libavdevice.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSpec {
    /// libavdevice input format, e.g. `video4linux2`, `avfoundation`, `dshow`.
    pub backend: String,
    /// Device name as the backend expects it (`/dev/video0`, `0`, `video=...`).
    pub device: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<u32>,
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self {
            backend: default_backend().to_string(),
            device: default_device().to_string(),
            width: None,
            height: None,
            framerate: None,
        }
    }
}

pub fn default_backend() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "video4linux2"
    }
}

pub fn default_device() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "/dev/video0"
    }
}

/// Names of the video input devices libavdevice was built with.
pub fn available_backends() -> Result<Vec<String>, CaptureError> {
    ffmpeg_next::init()?;
    ffmpeg_next::device::register_all();
    Ok(ffmpeg_next::device::input::video()
        .map(|format| format.name().to_string())
        .collect())
}

/// Live camera capture via ffmpeg-next (libavdevice + libavcodec).
///
/// Decoded frames are converted to packed BGR24, the layout most camera
/// stacks hand out; `FrameSource` takes it from there.
pub struct FfmpegCamera {
    spec: CameraSpec,
    session: Option<CameraSession>,
    sequence: u64,
}

struct CameraSession {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: FfmpegCamera is owned by one thread at a time (it moves onto the
// capture thread and back); the ffmpeg pointers inside are never shared.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new(spec: CameraSpec) -> Self {
        Self {
            spec,
            session: None,
            sequence: 0,
        }
    }

    fn input_options(&self) -> ffmpeg_next::Dictionary<'static> {
        let mut options = ffmpeg_next::Dictionary::new();
        if let (Some(w), Some(h)) = (self.spec.width, self.spec.height) {
            options.set("video_size", &format!("{w}x{h}"));
        }
        if let Some(fps) = self.spec.framerate {
            options.set("framerate", &fps.to_string());
        }
        options
    }
}

fn find_input_format(backend: &str) -> Option<ffmpeg_next::format::Format> {
    // Demuxer names may carry aliases, e.g. "video4linux2,v4l2".
    ffmpeg_next::device::input::video()
        .find(|format| format.name().split(',').any(|alias| alias == backend))
}

impl CaptureDevice for FfmpegCamera {
    fn open(&mut self) -> Result<DeviceInfo, CaptureError> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let format = find_input_format(&self.spec.backend)
            .ok_or_else(|| format!("capture backend '{}' is not available", self.spec.backend))?;
        let input = ffmpeg_next::format::open_with(&self.spec.device, &format, self.input_options())?
            .input();

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("capture device has no video stream")?;
        let stream_index = stream.index();
        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::BGR24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        self.session = Some(CameraSession {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        });
        self.sequence = 0;

        Ok(DeviceInfo {
            name: format!("{}:{}", self.spec.backend, self.spec.device),
            width,
            height,
            fps,
        })
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let session = self.session.as_mut().ok_or("FfmpegCamera: not opened")?;

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        loop {
            // Drain pictures the decoder already holds before feeding it more.
            match session.decoder.receive_frame(&mut decoded) {
                Ok(()) => break,
                Err(e) if needs_more_input(&e) => {}
                Err(ffmpeg_next::Error::Eof) => return Err("capture stream ended".into()),
                Err(e) => return Err(e.into()),
            }

            let Some((stream, packet)) = session.input.packets().next() else {
                return Err("capture stream ended".into());
            };
            if stream.index() == session.stream_index {
                session.decoder.send_packet(&packet)?;
            }
        }

        let mut converted = ffmpeg_next::util::frame::video::Video::empty();
        session.scaler.run(&decoded, &mut converted)?;
        let pixels = packed_pixels(&converted, session.width, session.height);

        let frame = Frame::new(
            pixels,
            session.width,
            session.height,
            ColorSpace::Bgr,
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        self.session = None;
    }
}

/// `EAGAIN` from `receive_frame` means the decoder has no picture ready
/// until it is sent another packet. Anything else is a real failure.
fn needs_more_input(err: &ffmpeg_next::Error) -> bool {
    matches!(err, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::error::EAGAIN)
}

/// Copies a 3-byte-per-pixel ffmpeg frame into a tightly packed buffer,
/// dropping the per-row stride padding.
fn packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
