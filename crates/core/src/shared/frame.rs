use std::time::Instant;

use ndarray::ArrayView3;

use crate::shared::region::Region;

/// Channel order of the packed 8-bit pixels in a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Bgr,
}

impl ColorSpace {
    pub fn channels(self) -> u8 {
        3
    }
}

/// A captured image: contiguous packed pixels in row-major order.
///
/// Frames are immutable once built. Conversions (`into_rgb`, `crop`)
/// produce new frames, so a frame handed to the task queue is never
/// aliased by the capture thread.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    color_space: ColorSpace,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        color_space: ColorSpace,
        sequence: u64,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (color_space.channels() as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            color_space,
            sequence,
            captured_at: Instant::now(),
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
        self.color_space.channels()
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Capture order assigned by the device, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Reorders channels to RGB. No-op for frames that already are.
    pub fn into_rgb(mut self) -> Frame {
        if self.color_space == ColorSpace::Bgr {
            for px in self.data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            self.color_space = ColorSpace::Rgb;
        }
        self
    }

    /// Copies the part of the frame covered by `region`.
    ///
    /// The region is clamped to the frame first; returns `None` when
    /// nothing of it lies inside the frame.
    pub fn crop(&self, region: &Region) -> Option<Frame> {
        let r = region.clamped(self.width, self.height)?;
        let ch = self.channels() as usize;
        let stride = self.width as usize * ch;
        let (x, y, w, h) = (r.x as usize, r.y as usize, r.width as usize, r.height as usize);

        let mut data = Vec::with_capacity(w * h * ch);
        for row in y..y + h {
            let start = row * stride + x * ch;
            data.extend_from_slice(&self.data[start..start + w * ch]);
        }

        Some(Frame {
            data,
            width: w as u32,
            height: h as u32,
            color_space: self.color_space,
            sequence: self.sequence,
            captured_at: self.captured_at,
        })
    }

    /// `(height, width, channels)` view over the pixel buffer.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels() as usize,
            ),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }
}
