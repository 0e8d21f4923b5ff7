use std::time::Duration;

use thiserror::Error;

use crate::capture::domain::capture_device::CaptureError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("capture device unavailable: {0}")]
    DeviceOpen(#[source] CaptureError),
    #[error("capture device read failed after {frames} frames: {source}")]
    DeviceRead {
        frames: u64,
        #[source]
        source: CaptureError,
    },
    #[error("capture thread did not stop within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("capture thread panicked")]
    CapturePanicked,
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("capture device was lost with a previous capture thread")]
    DeviceLost,
}

/// Which display pane a render failure happened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pane {
    Primary,
    Secondary,
}

impl std::fmt::Display for Pane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pane::Primary => write!(f, "primary"),
            Pane::Secondary => write!(f, "secondary"),
        }
    }
}

/// Failure inside a single frame task. Never fatal to the pipeline.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("rendering frame {sequence} to the {pane} display failed: {source}")]
    Render {
        sequence: u64,
        pane: Pane,
        #[source]
        source: Box<dyn std::error::Error>,
    },
    #[error("face detection failed on frame {sequence}: {source}")]
    Detection {
        sequence: u64,
        #[source]
        source: Box<dyn std::error::Error>,
    },
    #[error("task for frame {sequence} panicked: {message}")]
    Panicked { sequence: u64, message: String },
}
