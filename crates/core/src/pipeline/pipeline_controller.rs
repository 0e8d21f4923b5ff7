use std::time::Duration;

use crate::capture::domain::capture_device::CaptureDevice;
use crate::capture::frame_source::FrameSource;
use crate::detection::domain::face_detector::FaceDetector;
use crate::display::domain::display_surface::DisplaySurface;
use crate::pipeline::dispatcher::{Dispatcher, TickOutcome};
use crate::pipeline::frame_task::FrameTask;
use crate::pipeline::infrastructure::capture_thread::{CaptureExit, CaptureStats, CaptureThread};
use crate::pipeline::pipeline_config::{PipelineConfig, StallPolicy};
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::stop_flag::StopFlag;
use crate::pipeline::task_queue::{task_queue, TaskSender};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    Running,
    /// The dispatcher gave up and the policy is to wait for the host.
    Stalled,
    Stopped,
    Failed { reason: String },
}

/// Owns both ends of the pipeline and is the only thing hosts talk to.
///
/// Lives on the display thread. The host drives it by calling
/// [`tick`](Self::tick) after each returned delay and must call
/// [`stop`](Self::stop) before tearing the display down (dropping the
/// controller also stops it).
pub struct PipelineController {
    config: PipelineConfig,
    source: Option<FrameSource>,
    sender: TaskSender<FrameTask>,
    dispatcher: Dispatcher,
    capture: Option<CaptureThread>,
    stop_flag: StopFlag,
    status: PipelineStatus,
    restarts: u32,
    last_stats: Option<CaptureStats>,
}

impl PipelineController {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        detector: Box<dyn FaceDetector>,
        logger: Box<dyn PipelineLogger>,
        config: PipelineConfig,
    ) -> Self {
        let (sender, receiver) = task_queue(config.queue_capacity);
        let dispatcher = Dispatcher::new(receiver, detector, logger, config.schedule);
        Self {
            config,
            source: Some(FrameSource::new(device)),
            sender,
            dispatcher,
            capture: None,
            stop_flag: StopFlag::new(),
            status: PipelineStatus::Idle,
            restarts: 0,
            last_stats: None,
        }
    }

    /// Opens the device, starts the capture thread and arms the
    /// dispatcher. Returns the delay before the first tick.
    pub fn start(&mut self) -> Result<Duration, PipelineError> {
        if self.capture.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        match self.launch() {
            Ok(delay) => {
                self.restarts = 0;
                self.status = PipelineStatus::Running;
                log::info!(
                    "Pipeline started (queue capacity {}, stall policy {:?})",
                    self.sender.capacity(),
                    self.config.stall_policy
                );
                Ok(delay)
            }
            Err(e) => {
                self.status = PipelineStatus::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn launch(&mut self) -> Result<Duration, PipelineError> {
        let mut source = self.source.take().ok_or(PipelineError::DeviceLost)?;
        if let Err(e) = source.open() {
            self.source = Some(source);
            return Err(e);
        }
        self.dispatcher.discard_pending();
        self.stop_flag = StopFlag::new();
        self.capture = Some(CaptureThread::spawn(
            source,
            self.sender.clone(),
            self.stop_flag.clone(),
        )?);
        Ok(self.dispatcher.resume())
    }

    /// Runs one dispatcher tick and applies the fault and stall policies.
    /// Returns when to tick next, or `None` to stop scheduling.
    pub fn tick(&mut self, display: &mut dyn DisplaySurface) -> Option<Duration> {
        match self.dispatcher.tick(display) {
            TickOutcome::Executed => self.restarts = 0,
            TickOutcome::Failed | TickOutcome::Inactive => {}
            TickOutcome::Empty => {
                self.check_capture();
            }
            TickOutcome::GaveUp => {
                if !self.check_capture() {
                    self.on_give_up();
                }
            }
        }
        self.dispatcher.next_delay()
    }

    /// Surfaces a capture failure once the frames captured before it
    /// have been drained. Returns `true` if the pipeline was shut down.
    fn check_capture(&mut self) -> bool {
        let reason = match self.capture.as_mut().and_then(|c| c.poll_exit()) {
            Some(CaptureExit::Failed { error, .. }) => error.to_string(),
            Some(CaptureExit::Panicked) => PipelineError::CapturePanicked.to_string(),
            Some(CaptureExit::Stopped(_)) | None => return false,
        };
        log::error!("Capture ended: {reason}; shutting the pipeline down");
        self.shut_down_with(reason);
        true
    }

    fn on_give_up(&mut self) {
        match self.config.stall_policy {
            StallPolicy::Observe => {
                log::warn!("Capture stalled; waiting for the host to resume polling");
                self.status = PipelineStatus::Stalled;
            }
            StallPolicy::Shutdown => {
                log::warn!("Capture stalled; stopping the pipeline");
                if let Err(e) = self.stop() {
                    log::error!("Stopping stalled pipeline failed: {e}");
                }
            }
            StallPolicy::Restart { max_restarts } if self.restarts >= max_restarts => {
                let reason = format!("capture stalled after {max_restarts} restarts");
                log::error!("{reason}; giving up");
                self.shut_down_with(reason);
            }
            StallPolicy::Restart { max_restarts } => {
                self.restarts += 1;
                log::warn!(
                    "Capture stalled; restarting ({}/{max_restarts})",
                    self.restarts
                );
                self.restart();
            }
        }
    }

    fn restart(&mut self) {
        let relaunched = self
            .shutdown_capture()
            .and_then(|_| self.launch());
        if let Err(e) = relaunched {
            log::error!("Restarting capture failed: {e}");
            self.dispatcher.halt();
            self.status = PipelineStatus::Failed {
                reason: e.to_string(),
            };
        }
    }

    fn shut_down_with(&mut self, reason: String) {
        if let Err(e) = self.stop() {
            log::error!("{e}");
        }
        self.status = PipelineStatus::Failed { reason };
    }

    /// Stops the pipeline: raises the stop flag, waits (bounded) for the
    /// capture thread to exit, closes the device and halts the dispatcher.
    ///
    /// Idempotent. On [`PipelineError::ShutdownTimeout`] the device is left
    /// open and the thread handle is kept, so a later call can finish the
    /// job.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        let result = self.shutdown_capture();
        self.dispatcher.halt();
        self.dispatcher.discard_pending();
        match result {
            Ok(was_running) => {
                if was_running {
                    log::info!("Pipeline stopped");
                }
                if !matches!(self.status, PipelineStatus::Failed { .. }) {
                    self.status = PipelineStatus::Stopped;
                }
                Ok(())
            }
            Err(e) => {
                log::error!("{e}");
                self.status = PipelineStatus::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Steps 1-3 of the shutdown protocol. Returns whether a capture
    /// thread was running.
    fn shutdown_capture(&mut self) -> Result<bool, PipelineError> {
        let Some(mut capture) = self.capture.take() else {
            return Ok(false);
        };
        self.stop_flag.raise();
        if !capture.wait(self.config.shutdown_timeout) {
            self.capture = Some(capture);
            return Err(PipelineError::ShutdownTimeout(self.config.shutdown_timeout));
        }
        let (mut source, exit) = capture.join()?;
        source.close();
        self.source = Some(source);
        if let Some(stats) = exit.stats() {
            log::info!(
                "Capture thread exited: {} frames captured, {} dropped at the queue",
                stats.captured,
                stats.dropped
            );
            self.last_stats = Some(stats);
        }
        Ok(true)
    }

    /// Re-arms a dispatcher that gave up under [`StallPolicy::Observe`].
    pub fn resume_polling(&mut self) -> Option<Duration> {
        if self.status != PipelineStatus::Stalled {
            return None;
        }
        self.status = PipelineStatus::Running;
        Some(self.dispatcher.resume())
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status,
            PipelineStatus::Running | PipelineStatus::Stalled
        )
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Counters reported by the most recent capture thread to exit.
    pub fn last_capture_stats(&self) -> Option<CaptureStats> {
        self.last_stats
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Pipeline did not shut down cleanly: {e}");
        }
    }
}
