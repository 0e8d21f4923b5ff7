use std::time::Duration;

/// Poll interval after a tick that executed a task.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_millis(70);

/// Poll interval after a tick that found the queue empty.
pub const SLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive empty polls tolerated before the dispatcher gives up.
pub const MAX_STALL: u32 = 50;

/// Tasks buffered between the capture thread and the dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2;

/// How long `stop()` waits for the capture thread to leave its loop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Restarts attempted after a stall before the pipeline is shut down.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_128.onnx";

/// Edge length of the square preview panes, in pixels.
pub const PREVIEW_SIZE: u32 = 200;
