use std::time::Instant;

use crate::detection::domain::face_crop::crop_first_face;
use crate::detection::domain::face_detector::FaceDetector;
use crate::display::domain::display_surface::DisplaySurface;
use crate::pipeline::pipeline_error::{Pane, TaskError};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;

/// One unit of consumer work: show the raw frame, detect, show the result.
///
/// Built by the capture thread, which gives up the frame on enqueue; run
/// once by the dispatcher on the display thread.
pub struct FrameTask {
    frame: Frame,
}

impl FrameTask {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence()
    }

    pub fn run(
        self,
        detector: &mut dyn FaceDetector,
        display: &mut dyn DisplaySurface,
        logger: &mut dyn PipelineLogger,
    ) -> Result<(), TaskError> {
        let sequence = self.frame.sequence();

        let t0 = Instant::now();
        display
            .show_primary(&self.frame)
            .map_err(|source| TaskError::Render {
                sequence,
                pane: Pane::Primary,
                source,
            })?;
        logger.timing("render_primary", elapsed_ms(t0));

        let t1 = Instant::now();
        let result = crop_first_face(detector, self.frame)
            .map_err(|source| TaskError::Detection { sequence, source })?;
        logger.timing("detect", elapsed_ms(t1));

        let t2 = Instant::now();
        display
            .show_secondary(&result)
            .map_err(|source| TaskError::Render {
                sequence,
                pane: Pane::Secondary,
                source,
            })?;
        logger.timing("render_secondary", elapsed_ms(t2));

        logger.frame_displayed(sequence);
        Ok(())
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
