use iced::widget::image::Handle;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};

use facecam_core::display::domain::display_surface::DisplaySurface;
use facecam_core::shared::frame::Frame;

/// The two image panes of the window, as a display surface.
///
/// Every frame is scaled to a fixed square before it is handed to iced,
/// so both panes keep their size whatever the camera or crop delivers.
pub struct PreviewPanes {
    size: u32,
    primary: Option<Handle>,
    secondary: Option<Handle>,
}

impl PreviewPanes {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            primary: None,
            secondary: None,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn primary(&self) -> Option<&Handle> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&Handle> {
        self.secondary.as_ref()
    }

    fn render(&self, frame: &Frame) -> Result<Handle, Box<dyn std::error::Error>> {
        let rgba = scale_to_preview(frame, self.size)?;
        Ok(Handle::from_rgba(self.size, self.size, rgba.into_raw()))
    }
}

impl DisplaySurface for PreviewPanes {
    fn show_primary(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.primary = Some(self.render(frame)?);
        Ok(())
    }

    fn show_secondary(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.secondary = Some(self.render(frame)?);
        Ok(())
    }
}

fn scale_to_preview(frame: &Frame, size: u32) -> Result<RgbaImage, Box<dyn std::error::Error>> {
    let rgb = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| {
            format!(
                "frame #{} is not a packed {}x{} RGB image",
                frame.sequence(),
                frame.width(),
                frame.height()
            )
        })?;
    let scaled = imageops::resize(&rgb, size, size, FilterType::Triangle);
    Ok(DynamicImage::ImageRgb8(scaled).into_rgba8())
}
