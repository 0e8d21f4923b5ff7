use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use facecam_core::capture::infrastructure::ffmpeg_camera::CameraSpec;
use facecam_core::detection::infrastructure::onnx_blazeface_detector::ClassifierParams;
use facecam_core::pipeline::pipeline_config::{PipelineConfig, PollSchedule, StallPolicy};
use facecam_core::shared::constants::{
    DEFAULT_MAX_RESTARTS, DEFAULT_QUEUE_CAPACITY, MAX_STALL, PREVIEW_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnStall {
    Observe,
    Shutdown,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Camera backend and device; platform defaults when unset.
    pub backend: Option<String>,
    pub device: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<u32>,
    pub queue_capacity: usize,
    pub max_stall: u32,
    pub on_stall: OnStall,
    pub max_restarts: u32,
    pub min_confidence: f32,
    pub model_url: Option<String>,
    /// Edge length of the square preview panes, in pixels.
    pub preview_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: None,
            device: None,
            width: None,
            height: None,
            framerate: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_stall: MAX_STALL,
            on_stall: OnStall::Restart,
            max_restarts: DEFAULT_MAX_RESTARTS,
            min_confidence: ClassifierParams::default().min_confidence,
            model_url: None,
            preview_size: PREVIEW_SIZE,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("facecam").join("settings.json"))
    }

    /// Loads saved settings, falling back to defaults on any error. The
    /// first launch writes the defaults out so there is a file to edit.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_or_init(&path))
            .unwrap_or_default()
    }

    /// Like [`load_from`](Self::load_from), but writes the defaults to
    /// `path` when nothing is there yet. An unreadable file is left alone.
    pub fn load_or_init(path: &Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        match settings.save_to(path) {
            Ok(()) => log::info!("Wrote default settings to {}", path.display()),
            Err(e) => log::warn!("Could not save settings to {}: {e}", path.display()),
        }
        settings
    }

    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    pub fn camera_spec(&self) -> CameraSpec {
        let defaults = CameraSpec::default();
        CameraSpec {
            backend: self.backend.clone().unwrap_or(defaults.backend),
            device: self.device.clone().unwrap_or(defaults.device),
            width: self.width,
            height: self.height,
            framerate: self.framerate,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let stall_policy = match self.on_stall {
            OnStall::Observe => StallPolicy::Observe,
            OnStall::Shutdown => StallPolicy::Shutdown,
            OnStall::Restart => StallPolicy::Restart {
                max_restarts: self.max_restarts,
            },
        };
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            schedule: PollSchedule {
                max_stall: self.max_stall,
                ..PollSchedule::default()
            },
            stall_policy,
            ..PipelineConfig::default()
        }
    }

    pub fn classifier_params(&self) -> ClassifierParams {
        ClassifierParams {
            min_confidence: self.min_confidence.clamp(0.0, 1.0),
            ..ClassifierParams::default()
        }
    }

    pub fn preview_size(&self) -> u32 {
        self.preview_size.max(16)
    }
}
