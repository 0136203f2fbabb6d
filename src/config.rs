use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::PixelFormat;
use crate::error::{Error, Result};
use crate::trigger::TriggerSignal;

/// On-disk encoding of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain greyscale PGM (`P2`).
    Pgm,
    /// PNG through the `image` crate.
    Png,
}

/// Device settings written once at session setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub pixel_format: PixelFormat,
    pub exposure_time_raw: u32,
    pub socket_buffer_size: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::BayerBG8,
            exposure_time_raw: 30000,
            socket_buffer_size: 127,
        }
    }
}

/// Configuration of the capture process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// File rewritten after every successful capture.
    pub output: PathBuf,
    pub format: OutputFormat,
    pub grab_timeout_ms: u64,
    pub trigger_signal: TriggerSignal,
    /// Program spawned, detached and without arguments, after each save.
    pub post_capture_hook: Option<PathBuf>,
    pub camera: CameraSettings,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("saida.pgm"),
            format: OutputFormat::Pgm,
            grab_timeout_ms: 3000,
            trigger_signal: TriggerSignal::Interrupt,
            post_capture_hook: None,
            camera: CameraSettings::default(),
        }
    }
}

impl CaptureConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab_timeout_ms)
    }
}
