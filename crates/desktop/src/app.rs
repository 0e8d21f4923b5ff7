use std::time::Duration;

use iced::widget::image::Handle;
use iced::widget::{button, column, container, row, text, Image, Space};
use iced::{window, Alignment, Element, Length, Subscription, Task};

use facecam_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use facecam_core::detection::infrastructure::model_store::ModelStore;
use facecam_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use facecam_core::pipeline::pipeline_controller::{PipelineController, PipelineStatus};
use facecam_core::pipeline::pipeline_logger::NullPipelineLogger;
use facecam_core::shared::constants::BLAZEFACE_MODEL_NAME;

use crate::preview::PreviewPanes;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    CloseRequested(window::Id),
    ResumePolling,
    Restart,
}

pub struct App {
    controller: Option<PipelineController>,
    panes: PreviewPanes,
    next_tick: Option<Duration>,
    setup_error: Option<String>,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let settings = Settings::load();
        let panes = PreviewPanes::new(settings.preview_size());
        let pipeline = build_controller(&settings).map_err(|e| {
            log::error!("Pipeline setup failed: {e}");
            e.to_string()
        });
        (Self::with_pipeline(pipeline, panes), Task::none())
    }

    /// Wraps an already built controller (or the reason there is none)
    /// and starts it.
    fn with_pipeline(pipeline: Result<PipelineController, String>, panes: PreviewPanes) -> Self {
        let (controller, setup_error) = match pipeline {
            Ok(controller) => (Some(controller), None),
            Err(reason) => (None, Some(reason)),
        };
        let mut app = Self {
            controller,
            panes,
            next_tick: None,
            setup_error,
        };
        app.start();
        app
    }

    fn start(&mut self) {
        if let Some(controller) = &mut self.controller {
            self.next_tick = match controller.start() {
                Ok(delay) => Some(delay),
                Err(e) => {
                    log::error!("Could not start the pipeline: {e}");
                    None
                }
            };
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => {
                if let Some(controller) = &mut self.controller {
                    self.next_tick = controller.tick(&mut self.panes);
                }
            }
            Message::CloseRequested(_id) => {
                // Release the camera before the window goes away.
                self.next_tick = None;
                if let Some(controller) = &mut self.controller {
                    if let Err(e) = controller.stop() {
                        log::error!("Pipeline did not stop cleanly: {e}");
                    }
                }
                return iced::exit();
            }
            Message::ResumePolling => {
                if let Some(controller) = &mut self.controller {
                    self.next_tick = controller.resume_polling();
                }
            }
            Message::Restart => {
                if let Some(controller) = &mut self.controller {
                    if let Err(e) = controller.stop() {
                        log::error!("Pipeline did not stop cleanly: {e}");
                        return Task::none();
                    }
                }
                self.start();
            }
        }
        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let size = self.panes.size() as f32;
        let panes = row![
            pane("Webcam Output", self.panes.primary().cloned(), size),
            pane("Face detection Output", self.panes.secondary().cloned(), size),
        ]
        .spacing(16);

        column![panes, self.status_bar()]
            .spacing(12)
            .padding(16)
            .into()
    }

    fn status_bar(&self) -> Element<'_, Message> {
        let Some(controller) = &self.controller else {
            let reason = self.setup_error.as_deref().unwrap_or("not configured");
            return text(format!("Unavailable: {reason}")).size(13).into();
        };

        let status = controller.status();
        let label = match status {
            PipelineStatus::Idle => "Starting".to_string(),
            PipelineStatus::Running => format!(
                "Running ({} frames shown)",
                controller.dispatcher().executed()
            ),
            PipelineStatus::Stalled => "Camera stalled".to_string(),
            PipelineStatus::Stopped => "Stopped".to_string(),
            PipelineStatus::Failed { reason } => format!("Failed: {reason}"),
        };

        let action = match status {
            PipelineStatus::Stalled => {
                Some(button(text("Resume").size(13)).on_press(Message::ResumePolling))
            }
            PipelineStatus::Stopped | PipelineStatus::Failed { .. } => {
                Some(button(text("Restart").size(13)).on_press(Message::Restart))
            }
            PipelineStatus::Idle | PipelineStatus::Running => None,
        };

        let mut bar = row![text(label).size(13), Space::new().width(Length::Fill)]
            .align_y(Alignment::Center);
        if let Some(action) = action {
            bar = bar.push(action);
        }
        bar.into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let close = window::close_requests().map(Message::CloseRequested);
        match self.next_tick {
            Some(delay) => Subscription::batch([
                close,
                iced::time::every(delay).map(|_| Message::Tick),
            ]),
            None => close,
        }
    }
}

fn pane<'a>(caption: &'a str, handle: Option<Handle>, size: f32) -> Element<'a, Message> {
    let picture: Element<'a, Message> = match handle {
        Some(handle) => Image::new(handle).width(size).height(size).into(),
        None => container(text("No frame yet").size(12))
            .width(size)
            .height(size)
            .center_x(size)
            .center_y(size)
            .into(),
    };
    column![text(caption).size(14), picture]
        .spacing(6)
        .align_x(Alignment::Center)
        .into()
}

fn build_controller(settings: &Settings) -> Result<PipelineController, Box<dyn std::error::Error>> {
    let model_path = ModelStore::user_cache()?
        .with_search_dir("models")
        .resolve(BLAZEFACE_MODEL_NAME, settings.model_url.as_deref())?;
    let detector = OnnxBlazefaceDetector::new(&model_path, settings.classifier_params())?;
    let camera = FfmpegCamera::new(settings.camera_spec());
    Ok(PipelineController::new(
        Box::new(camera),
        Box::new(detector),
        Box::new(NullPipelineLogger),
        settings.pipeline_config(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecam_core::capture::domain::capture_device::{CaptureDevice, CaptureError, DeviceInfo};
    use facecam_core::detection::domain::face_detector::FaceDetector;
    use facecam_core::pipeline::pipeline_config::PipelineConfig;
    use facecam_core::shared::frame::{ColorSpace, Frame};
    use facecam_core::shared::region::Region;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Emits tiny BGR frames and counts opens and closes.
    #[derive(Clone, Default)]
    struct CountingCamera {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        sequence: u64,
    }

    impl CountingCamera {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl CaptureDevice for CountingCamera {
        fn open(&mut self) -> Result<DeviceInfo, CaptureError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(DeviceInfo {
                name: "counting".into(),
                width: 2,
                height: 2,
                fps: 30.0,
            })
        }

        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            std::thread::sleep(Duration::from_millis(1));
            let frame = Frame::new(vec![0; 12], 2, 2, ColorSpace::Bgr, self.sequence);
            self.sequence += 1;
            Ok(frame)
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoFaces;

    impl FaceDetector for NoFaces {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(Vec::new())
        }
    }

    fn running_app(camera: &CountingCamera) -> App {
        let controller = PipelineController::new(
            Box::new(camera.clone()),
            Box::new(NoFaces),
            Box::new(NullPipelineLogger),
            PipelineConfig::default(),
        );
        App::with_pipeline(Ok(controller), PreviewPanes::new(32))
    }

    fn status(app: &App) -> Option<&PipelineStatus> {
        app.controller.as_ref().map(|c| c.status())
    }

    #[test]
    fn test_new_app_starts_pipeline() {
        let camera = CountingCamera::default();
        let app = running_app(&camera);

        assert_eq!(camera.opens(), 1);
        assert!(app.next_tick.is_some());
        assert_eq!(status(&app), Some(&PipelineStatus::Running));
    }

    #[test]
    fn test_close_request_stops_pipeline_before_exit() {
        let camera = CountingCamera::default();
        let mut app = running_app(&camera);
        for _ in 0..3 {
            let _ = app.update(Message::Tick);
        }

        let _ = app.update(Message::CloseRequested(window::Id::unique()));

        assert_eq!(camera.closes(), 1);
        assert!(app.next_tick.is_none());
        assert_eq!(status(&app), Some(&PipelineStatus::Stopped));

        drop(app);
        assert_eq!(camera.closes(), 1);
    }

    #[test]
    fn test_restart_reopens_camera() {
        let camera = CountingCamera::default();
        let mut app = running_app(&camera);

        let _ = app.update(Message::Restart);

        assert_eq!((camera.opens(), camera.closes()), (2, 1));
        assert!(app.next_tick.is_some());
        assert_eq!(status(&app), Some(&PipelineStatus::Running));
    }

    #[test]
    fn test_setup_error_leaves_app_idle() {
        let mut app = App::with_pipeline(
            Err("model missing".to_string()),
            PreviewPanes::new(32),
        );

        assert!(app.next_tick.is_none());
        assert_eq!(app.setup_error.as_deref(), Some("model missing"));

        let _ = app.update(Message::Tick);
        let _ = app.update(Message::CloseRequested(window::Id::unique()));
        assert!(app.next_tick.is_none());
    }
}
