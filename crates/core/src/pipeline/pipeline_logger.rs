use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting observer for pipeline orchestration events.
///
/// Keeps the dispatcher free of any particular output mechanism: the CLI
/// prints aggregates, the desktop app discards them.
pub trait PipelineLogger: Send {
    /// A task finished rendering the frame with this capture sequence.
    fn frame_displayed(&mut self, sequence: u64);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. queue depth).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn frame_displayed(&mut self, _sequence: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count/total/max for one stage or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub count: u64,
    pub total: f64,
    pub max: f64,
}

impl Aggregate {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        if self.count == 1 || value > self.max {
            self.max = value;
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// CLI-oriented logger: per-stage timing aggregates, metrics and a
/// summary when the pipeline halts.
///
/// A live camera never ends on its own, so everything is kept as running
/// aggregates instead of per-frame samples. Progress is logged every
/// `throttle_frames` displayed frames.
pub struct StdoutPipelineLogger {
    throttle_frames: u64,
    timings: BTreeMap<String, Aggregate>,
    metrics: BTreeMap<String, Aggregate>,
    start_time: Instant,
    frames_displayed: u64,
    last_sequence: Option<u64>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: u64) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            frames_displayed: 0,
            last_sequence: None,
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let frames = self.frames_displayed;
        let mut lines = vec![format!(
            "Pipeline summary ({frames} frames displayed, {elapsed_s:.1}s total):"
        )];

        for (stage, agg) in &self.timings {
            lines.push(format!(
                "  {stage:16}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                agg.mean(),
                agg.max,
                agg.total
            ));
        }

        for (name, agg) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}  max {:.0}", agg.mean(), agg.max));
        }

        if frames > 0 && elapsed_s > 0.0 {
            lines.push(format!("  Throughput: {:.1} fps", frames as f64 / elapsed_s));
        }

        Some(lines.join("\n"))
    }

    pub fn timing_for(&self, stage: &str) -> Option<&Aggregate> {
        self.timings.get(stage)
    }

    pub fn metric_for(&self, name: &str) -> Option<&Aggregate> {
        self.metrics.get(name)
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    /// Capture sequences skipped between consecutive displayed frames,
    /// i.e. frames dropped at the queue or lost to failed tasks.
    fn gap_since_last(&self, sequence: u64) -> u64 {
        match self.last_sequence {
            Some(last) if sequence > last => sequence - last - 1,
            _ => 0,
        }
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn frame_displayed(&mut self, sequence: u64) {
        let gap = self.gap_since_last(sequence);
        if gap > 0 {
            self.metric("skipped_frames", gap as f64);
        }
        self.last_sequence = Some(sequence);
        self.frames_displayed += 1;
        if self.frames_displayed % self.throttle_frames == 0 {
            log::info!(
                "Displayed {} frames (latest capture #{sequence})",
                self.frames_displayed
            );
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
