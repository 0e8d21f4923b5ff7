use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::capture::frame_source::FrameSource;
use crate::pipeline::frame_task::FrameTask;
use crate::pipeline::pipeline_error::PipelineError;
use crate::pipeline::stop_flag::StopFlag;
use crate::pipeline::task_queue::TaskSender;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub dropped: u64,
}

/// Why the capture loop ended.
#[derive(Debug)]
pub enum CaptureExit {
    /// The stop flag was raised.
    Stopped(CaptureStats),
    /// A device read failed; no task was built for it.
    Failed {
        stats: CaptureStats,
        error: PipelineError,
    },
    /// The thread died without reporting.
    Panicked,
}

impl CaptureExit {
    pub fn stats(&self) -> Option<CaptureStats> {
        match self {
            CaptureExit::Stopped(stats) | CaptureExit::Failed { stats, .. } => Some(*stats),
            CaptureExit::Panicked => None,
        }
    }
}

/// Handle to the producer thread.
///
/// The thread owns the [`FrameSource`] while it runs and hands it back on
/// join, so the device can only be closed once the loop has exited.
pub struct CaptureThread {
    handle: JoinHandle<FrameSource>,
    exit_rx: Receiver<CaptureExit>,
    exit: Option<CaptureExit>,
}

impl CaptureThread {
    /// Starts the capture loop on an already-open source.
    ///
    /// If the thread cannot be spawned the source is dropped, which
    /// releases the device.
    pub fn spawn(
        source: FrameSource,
        sender: TaskSender<FrameTask>,
        stop: StopFlag,
    ) -> Result<Self, PipelineError> {
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name("facecam-capture".into())
            .spawn(move || capture_loop(source, sender, stop, exit_tx))
            .map_err(PipelineError::Spawn)?;
        Ok(Self {
            handle,
            exit_rx,
            exit: None,
        })
    }

    /// Non-blocking check for the loop's exit report.
    pub fn poll_exit(&mut self) -> Option<&CaptureExit> {
        if self.exit.is_none() {
            self.exit = match self.exit_rx.try_recv() {
                Ok(exit) => Some(exit),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(CaptureExit::Panicked),
            };
        }
        self.exit.as_ref()
    }

    /// Waits up to `timeout` for the loop to exit. Returns `false` if it
    /// is still running.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.exit.is_some() {
            return true;
        }
        self.exit = match self.exit_rx.recv_timeout(timeout) {
            Ok(exit) => Some(exit),
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => Some(CaptureExit::Panicked),
        };
        true
    }

    /// Joins the thread and takes back the source. Call only after
    /// [`wait`](Self::wait) returned `true`.
    pub fn join(mut self) -> Result<(FrameSource, CaptureExit), PipelineError> {
        self.poll_exit();
        let source = self
            .handle
            .join()
            .map_err(|_| PipelineError::CapturePanicked)?;
        let exit = self.exit.unwrap_or(CaptureExit::Panicked);
        Ok((source, exit))
    }
}

fn capture_loop(
    mut source: FrameSource,
    sender: TaskSender<FrameTask>,
    stop: StopFlag,
    exit_tx: Sender<CaptureExit>,
) -> FrameSource {
    let mut stats = CaptureStats::default();
    let exit = loop {
        if stop.is_raised() {
            break CaptureExit::Stopped(stats);
        }
        match source.read_frame() {
            Ok(frame) => {
                stats.captured += 1;
                let sequence = frame.sequence();
                if !sender.try_enqueue(FrameTask::new(frame)) {
                    stats.dropped += 1;
                    log::trace!("Queue full, dropped frame #{sequence}");
                }
            }
            Err(error) => {
                log::error!("{error}");
                break CaptureExit::Failed { stats, error };
            }
        }
    };
    let _ = exit_tx.send(exit);
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame_source::tests::{DeviceProbe, ScriptedDevice};
    use crate::pipeline::task_queue::task_queue;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn open_source(device: ScriptedDevice) -> FrameSource {
        let mut source = FrameSource::new(Box::new(device));
        source.open().unwrap();
        source
    }

    #[test]
    fn test_read_failure_ends_loop_after_four_frames() {
        let probe = DeviceProbe::default();
        let source = open_source(ScriptedDevice::new(probe.clone()).failing_on_read(5));
        let (tx, rx) = task_queue(8);

        let mut capture = CaptureThread::spawn(source, tx, StopFlag::new()).unwrap();
        assert!(capture.wait(TIMEOUT));
        let (source, exit) = capture.join().unwrap();

        match exit {
            CaptureExit::Failed { stats, error } => {
                assert_eq!(stats.captured, 4);
                assert!(matches!(error, PipelineError::DeviceRead { frames: 4, .. }));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let sequences: Vec<_> = std::iter::from_fn(|| rx.try_dequeue())
            .map(|t| t.sequence())
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(probe.reads(), 5);
        assert!(source.is_open());
        assert_eq!(probe.closes(), 0);
    }

    #[test]
    fn test_full_queue_counts_drops() {
        let source = open_source(ScriptedDevice::new(DeviceProbe::default()).failing_on_read(6));
        let (tx, rx) = task_queue(2);

        let mut capture = CaptureThread::spawn(source, tx, StopFlag::new()).unwrap();
        assert!(capture.wait(TIMEOUT));
        let (_source, exit) = capture.join().unwrap();

        assert_eq!(
            exit.stats(),
            Some(CaptureStats {
                captured: 5,
                dropped: 3
            })
        );
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_dequeue().map(|t| t.sequence()), Some(0));
    }

    #[test]
    fn test_stop_flag_ends_loop() {
        let probe = DeviceProbe::default();
        let source = open_source(
            ScriptedDevice::new(probe.clone()).with_read_delay(Duration::from_millis(2)),
        );
        let (tx, _rx) = task_queue(2);
        let stop = StopFlag::new();

        let mut capture = CaptureThread::spawn(source, tx, stop.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(capture.poll_exit().is_none());

        stop.raise();
        assert!(capture.wait(TIMEOUT));
        let (_source, exit) = capture.join().unwrap();

        assert!(matches!(exit, CaptureExit::Stopped(_)));
        let reads = probe.reads();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(probe.reads(), reads);
    }

    #[test]
    fn test_wait_times_out_while_read_in_progress() {
        let probe = DeviceProbe::default();
        let source = open_source(
            ScriptedDevice::new(probe.clone()).with_read_delay(Duration::from_millis(200)),
        );
        let (tx, _rx) = task_queue(2);
        let stop = StopFlag::new();
        let mut capture = CaptureThread::spawn(source, tx, stop.clone()).unwrap();

        // The flag must go up only once the thread is inside a read.
        probe.wait_for_reads(1);
        stop.raise();
        assert!(!capture.wait(Duration::from_millis(10)));
        assert!(capture.wait(TIMEOUT));
    }

    #[test]
    fn test_preraised_flag_reads_nothing() {
        let probe = DeviceProbe::default();
        let source = open_source(ScriptedDevice::new(probe.clone()));
        let (tx, rx) = task_queue(2);
        let stop = StopFlag::new();
        stop.raise();

        let mut capture = CaptureThread::spawn(source, tx, stop).unwrap();
        assert!(capture.wait(TIMEOUT));
        capture.join().unwrap();

        assert_eq!(probe.reads(), 0);
        assert!(rx.is_empty());
    }
}
