use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use facecam_core::capture::infrastructure::ffmpeg_camera::{
    available_backends, default_backend, default_device, CameraSpec, FfmpegCamera,
};
use facecam_core::detection::domain::face_detector::FaceDetector;
use facecam_core::detection::infrastructure::model_store::ModelStore;
use facecam_core::detection::infrastructure::onnx_blazeface_detector::{
    ClassifierParams, OnnxBlazefaceDetector,
};
use facecam_core::display::domain::display_surface::DisplaySurface;
use facecam_core::pipeline::pipeline_config::{PipelineConfig, PollSchedule, StallPolicy};
use facecam_core::pipeline::pipeline_controller::{PipelineController, PipelineStatus};
use facecam_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facecam_core::shared::constants::{
    BLAZEFACE_MODEL_NAME, DEFAULT_MAX_RESTARTS, DEFAULT_QUEUE_CAPACITY, MAX_STALL,
};
use facecam_core::shared::frame::Frame;

/// Runs the live face-detection pipeline without a window.
#[derive(Parser)]
#[command(name = "facecam")]
struct Cli {
    /// libavdevice input format (platform default if omitted).
    #[arg(long)]
    backend: Option<String>,

    /// Camera device name as the backend expects it.
    #[arg(long)]
    device: Option<String>,

    /// Requested capture width.
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height.
    #[arg(long)]
    height: Option<u32>,

    /// Requested capture frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Path to a BlazeFace ONNX model (looked up in the cache if omitted).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Download the model from this URL when it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Minimum face confidence (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f32,

    /// Frames buffered between capture and display.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Consecutive empty polls tolerated before giving up.
    #[arg(long, default_value_t = MAX_STALL)]
    max_stall: u32,

    /// What to do when capture stalls: observe, shutdown or restart.
    #[arg(long, default_value = "restart")]
    stall_policy: String,

    /// Restart attempts before giving up (restart policy only).
    #[arg(long, default_value_t = DEFAULT_MAX_RESTARTS)]
    max_restarts: u32,

    /// Stop after this many seconds (runs until Ctrl-C otherwise).
    #[arg(long)]
    duration: Option<f64>,

    /// List the video input backends ffmpeg was built with, then exit.
    #[arg(long)]
    list_backends: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.list_backends {
        for name in available_backends()? {
            println!("{name}");
        }
        return Ok(());
    }

    validate(&cli)?;

    let detector = build_detector(&cli)?;
    let camera = FfmpegCamera::new(camera_spec(&cli));
    let config = pipeline_config(&cli)?;

    let mut controller = PipelineController::new(
        Box::new(camera),
        detector,
        Box::new(StdoutPipelineLogger::default()),
        config,
    );
    let mut display = HeadlessDisplay::default();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let deadline = cli
        .duration
        .map(|secs| deadline_after(secs, Instant::now()))
        .transpose()?;

    let mut delay = controller.start()?;
    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        thread::sleep(delay);
        delay = match controller.tick(&mut display) {
            Some(next) => next,
            None if controller.status() == &PipelineStatus::Stalled => {
                log::warn!("No frames from the camera; polling again");
                match controller.resume_polling() {
                    Some(next) => next,
                    None => break,
                }
            }
            None => break,
        };
    }

    controller.stop()?;
    log::info!(
        "Displayed {} frames ({} primary-only)",
        display.secondary_frames,
        display.primary_frames - display.secondary_frames
    );

    match controller.status() {
        PipelineStatus::Failed { reason } => Err(reason.clone().into()),
        _ => Ok(()),
    }
}

/// Stands in for a window: counts what would have been shown.
#[derive(Default)]
struct HeadlessDisplay {
    primary_frames: u64,
    secondary_frames: u64,
}

impl DisplaySurface for HeadlessDisplay {
    fn show_primary(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.primary_frames += 1;
        log::trace!("Frame #{} {}x{}", frame.sequence(), frame.width(), frame.height());
        Ok(())
    }

    fn show_secondary(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.secondary_frames += 1;
        log::debug!(
            "Frame #{} detection output {}x{}",
            frame.sequence(),
            frame.width(),
            frame.height()
        );
        Ok(())
    }
}

fn build_detector(cli: &Cli) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let model_path = match &cli.model {
        Some(path) => path.clone(),
        None => {
            log::info!("Resolving model: {BLAZEFACE_MODEL_NAME}");
            ModelStore::user_cache()?
                .with_search_dir("models")
                .resolve(BLAZEFACE_MODEL_NAME, cli.model_url.as_deref())?
        }
    };
    let params = ClassifierParams {
        min_confidence: cli.confidence,
        ..ClassifierParams::default()
    };
    Ok(Box::new(OnnxBlazefaceDetector::new(&model_path, params)?))
}

fn camera_spec(cli: &Cli) -> CameraSpec {
    CameraSpec {
        backend: cli
            .backend
            .clone()
            .unwrap_or_else(|| default_backend().to_string()),
        device: cli
            .device
            .clone()
            .unwrap_or_else(|| default_device().to_string()),
        width: cli.width,
        height: cli.height,
        framerate: cli.fps,
    }
}

fn pipeline_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    Ok(PipelineConfig {
        queue_capacity: cli.queue_capacity,
        schedule: PollSchedule {
            max_stall: cli.max_stall,
            ..PollSchedule::default()
        },
        stall_policy: parse_stall_policy(&cli.stall_policy, cli.max_restarts)?,
        ..PipelineConfig::default()
    })
}

fn parse_stall_policy(name: &str, max_restarts: u32) -> Result<StallPolicy, String> {
    match name {
        "observe" => Ok(StallPolicy::Observe),
        "shutdown" => Ok(StallPolicy::Shutdown),
        "restart" => Ok(StallPolicy::Restart { max_restarts }),
        other => Err(format!(
            "Stall policy must be one of: observe, shutdown, restart, got '{other}'"
        )),
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.queue_capacity == 0 {
        return Err("Queue capacity must be at least 1".into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.width.is_some() != cli.height.is_some() {
        return Err("--width and --height must be given together".into());
    }
    if let Some(secs) = cli.duration {
        deadline_after(secs, Instant::now())?;
    }
    if let Some(path) = &cli.model {
        if !path.exists() {
            return Err(format!("Model file not found: {}", path.display()).into());
        }
    }
    parse_stall_policy(&cli.stall_policy, cli.max_restarts)?;
    Ok(())
}

/// The instant `secs` seconds after `now`, rejecting durations that are
/// not positive or that the clock cannot represent.
fn deadline_after(secs: f64, now: Instant) -> Result<Instant, String> {
    let invalid = || format!("Duration must be a positive number of seconds, got {secs}");
    if secs <= 0.0 {
        return Err(invalid());
    }
    let span = Duration::try_from_secs_f64(secs).map_err(|_| invalid())?;
    now.checked_add(span)
        .ok_or_else(|| format!("Duration of {secs} seconds is too long"))
}
