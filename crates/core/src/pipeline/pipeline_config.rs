use std::time::Duration;

use crate::shared::constants::{
    DEFAULT_MAX_RESTARTS, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT, FAST_POLL_INTERVAL,
    MAX_STALL, SLOW_POLL_INTERVAL,
};

/// Dispatcher timing: how soon to poll again and how long to tolerate an
/// empty queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    pub fast: Duration,
    pub slow: Duration,
    pub max_stall: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            fast: FAST_POLL_INTERVAL,
            slow: SLOW_POLL_INTERVAL,
            max_stall: MAX_STALL,
        }
    }
}

/// What the controller does once the dispatcher has given up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallPolicy {
    /// Report `Stalled` and wait for `resume_polling`.
    Observe,
    /// Stop the pipeline.
    Shutdown,
    /// Re-open the device and restart capture, at most `max_restarts`
    /// times in a row without a frame getting through.
    Restart { max_restarts: u32 },
}

impl Default for StallPolicy {
    fn default() -> Self {
        StallPolicy::Restart {
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub schedule: PollSchedule,
    pub shutdown_timeout: Duration,
    pub stall_policy: StallPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            schedule: PollSchedule::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            stall_policy: StallPolicy::default(),
        }
    }
}
