// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CameraConfig, SurfaceId};
use crate::backends::tracking::{CameraGeometry, TrackingConfig};
use crate::constants::DEFAULT_TARGET_FPS;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Session configuration
///
/// Loaded from JSON; every field is optional in the file and falls back to
/// its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera to open on `run`
    pub camera: CameraConfig,
    /// Initial tracking configuration
    pub tracking: TrackingConfig,
    /// Initial display geometry and starting pose
    pub geometry: CameraGeometry,
    /// Frame rate of the session's own run loop
    pub target_fps: u32,
    /// Give up on `onBeforeRun` futures after this many milliseconds
    pub before_run_timeout_ms: Option<u64>,
    /// Prefer the secondary graphics context when opening the device
    pub use_secondary_graphics_context: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            tracking: TrackingConfig::default(),
            geometry: CameraGeometry::default(),
            target_fps: DEFAULT_TARGET_FPS,
            before_run_timeout_ms: None,
            use_secondary_graphics_context: true,
        }
    }
}

impl Config {
    /// Parse a config from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading config");
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Default config location (`<config dir>/camera-pipeline/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("camera-pipeline").join("config.json"))
    }

    /// Load the default config file, falling back to defaults if it is
    /// missing or invalid
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config");
                Self::default()
            }
        }
    }

    pub fn before_run_timeout(&self) -> Option<Duration> {
        self.before_run_timeout_ms.map(Duration::from_millis)
    }
}

/// Arguments of `Session::run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Surface the camera feed is drawn to
    pub surface: SurfaceId,
    /// Prefer the secondary graphics context if available
    pub use_secondary_graphics_context: bool,
    /// If true the session drives its own run loop and dispatches `onRender`;
    /// otherwise the caller calls `tick`/`post_render_tick` itself
    pub owns_run_loop: bool,
    pub camera: CameraConfig,
}

impl RunOptions {
    /// Options for an externally driven run loop
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            use_secondary_graphics_context: true,
            owns_run_loop: false,
            camera: CameraConfig::default(),
        }
    }

    /// Options derived from a loaded config
    pub fn from_config(config: &Config, surface: SurfaceId) -> Self {
        Self {
            surface,
            use_secondary_graphics_context: config.use_secondary_graphics_context,
            owns_run_loop: false,
            camera: config.camera.clone(),
        }
    }

    pub fn with_own_run_loop(mut self, owns_run_loop: bool) -> Self {
        self.owns_run_loop = owns_run_loop;
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }
}
