use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::detection::domain::face_detector::FaceDetector;
use crate::display::domain::display_surface::DisplaySurface;
use crate::pipeline::frame_task::FrameTask;
use crate::pipeline::pipeline_config::PollSchedule;
use crate::pipeline::pipeline_error::TaskError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::task_queue::TaskReceiver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Never resumed.
    Idle,
    Polling,
    /// Too many consecutive empty polls; waits for [`Dispatcher::resume`].
    GivenUp,
    /// Stopped by the controller.
    Halted,
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Executed,
    /// A task was dequeued but its render or detect step failed.
    Failed,
    Empty,
    /// The queue was empty once too often; polling has stopped.
    GaveUp,
    /// Not polling; the queue was not touched.
    Inactive,
}

/// Cooperative consumer of the task queue.
///
/// Runs on the thread that owns the display. It never blocks and never
/// sleeps: each [`tick`](Self::tick) does at most one dequeue and one
/// task, then [`next_delay`](Self::next_delay) tells the host's timer
/// when to call again (`None` means stop scheduling).
pub struct Dispatcher {
    receiver: TaskReceiver<FrameTask>,
    detector: Box<dyn FaceDetector>,
    logger: Box<dyn PipelineLogger>,
    schedule: PollSchedule,
    state: DispatcherState,
    stall_count: u32,
    next_delay: Option<Duration>,
    executed: u64,
    failed: u64,
}

impl Dispatcher {
    pub fn new(
        receiver: TaskReceiver<FrameTask>,
        detector: Box<dyn FaceDetector>,
        logger: Box<dyn PipelineLogger>,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            receiver,
            detector,
            logger,
            schedule,
            state: DispatcherState::Idle,
            stall_count: 0,
            next_delay: None,
            executed: 0,
            failed: 0,
        }
    }

    /// Enters `Polling` with a cleared stall counter. The only way out of
    /// `GivenUp` or `Halted`. Returns the delay before the first tick.
    pub fn resume(&mut self) -> Duration {
        self.stall_count = 0;
        self.state = DispatcherState::Polling;
        self.next_delay = Some(self.schedule.fast);
        self.schedule.fast
    }

    /// Stops scheduling. Emits the logger summary on the first halt.
    pub fn halt(&mut self) {
        if self.state == DispatcherState::Halted {
            return;
        }
        let was_active = self.state != DispatcherState::Idle;
        self.state = DispatcherState::Halted;
        self.next_delay = None;
        if was_active {
            self.logger.info(&format!(
                "Dispatcher halted: {} tasks executed, {} failed",
                self.executed, self.failed
            ));
            self.logger.summary();
        }
    }

    pub fn tick(&mut self, display: &mut dyn DisplaySurface) -> TickOutcome {
        if self.state != DispatcherState::Polling {
            return TickOutcome::Inactive;
        }

        let Some(task) = self.receiver.try_dequeue() else {
            return self.on_empty();
        };

        self.stall_count = 0;
        self.logger.metric("queue_depth", self.receiver.len() as f64);
        self.next_delay = Some(self.schedule.fast);

        match self.execute(task, display) {
            Ok(()) => {
                self.executed += 1;
                TickOutcome::Executed
            }
            Err(e) => {
                self.failed += 1;
                log::warn!("{e}");
                TickOutcome::Failed
            }
        }
    }

    fn on_empty(&mut self) -> TickOutcome {
        self.stall_count += 1;
        if self.stall_count <= self.schedule.max_stall {
            self.next_delay = Some(self.schedule.slow);
            return TickOutcome::Empty;
        }
        log::warn!(
            "Task queue empty for {} consecutive polls, giving up",
            self.stall_count
        );
        self.state = DispatcherState::GivenUp;
        self.next_delay = None;
        TickOutcome::GaveUp
    }

    fn execute(
        &mut self,
        task: FrameTask,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), TaskError> {
        let sequence = task.sequence();
        let detector = self.detector.as_mut();
        let logger = self.logger.as_mut();
        match panic::catch_unwind(AssertUnwindSafe(|| task.run(detector, display, logger))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Panicked {
                sequence,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Drops every buffered task, e.g. frames captured by a thread that
    /// has since been stopped.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.receiver.clear();
        if dropped > 0 {
            log::debug!("Discarded {dropped} pending tasks");
        }
        dropped
    }

    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn stall_count(&self) -> u32 {
        self.stall_count
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
