// SPDX-License-Identifier: GPL-3.0-only

//! Session information handed to lifecycle callbacks

use crate::backends::camera::{
    CameraConfig, CameraStatus, DeviceEvent, DeviceOrientation, Dimensions, SurfaceId,
};
use crate::backends::tracking::TrackingConfig;
use crate::config::RunOptions;

/// The most recent state of the session and its environment
///
/// Updated by `run` and by device events; lifecycle callbacks receive a
/// reference so that `onAttach` sees everything reported before it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub surface: Option<SurfaceId>,
    pub camera: CameraConfig,
    pub use_secondary_graphics_context: bool,
    pub owns_run_loop: bool,
    pub orientation: DeviceOrientation,
    pub canvas_size: Dimensions,
    pub video_size: Dimensions,
    pub camera_status: Option<CameraStatus>,
    pub app_resources_loaded: bool,
    pub tracking: TrackingConfig,
    pub version: &'static str,
}

impl SessionInfo {
    pub(crate) fn new(tracking: TrackingConfig) -> Self {
        Self {
            surface: None,
            camera: CameraConfig::default(),
            use_secondary_graphics_context: false,
            owns_run_loop: false,
            orientation: DeviceOrientation::default(),
            canvas_size: Dimensions::default(),
            video_size: Dimensions::default(),
            camera_status: None,
            app_resources_loaded: false,
            tracking,
            version: crate::version(),
        }
    }

    pub(crate) fn begin_run(&mut self, options: &RunOptions) {
        self.surface = Some(options.surface.clone());
        self.camera = options.camera.clone();
        self.use_secondary_graphics_context = options.use_secondary_graphics_context;
        self.owns_run_loop = options.owns_run_loop;
        self.camera_status = None;
    }

    /// Record a device event; returns `false` if it changed nothing
    pub(crate) fn apply(&mut self, event: &DeviceEvent) -> bool {
        match event {
            DeviceEvent::CameraStatusChange(status) => {
                let changed = self.camera_status.as_ref() != Some(status);
                self.camera_status = Some(status.clone());
                changed
            }
            DeviceEvent::DeviceOrientationChange(orientation) => {
                std::mem::replace(&mut self.orientation, *orientation) != *orientation
            }
            DeviceEvent::CanvasSizeChange(size) => {
                std::mem::replace(&mut self.canvas_size, *size) != *size
            }
            DeviceEvent::VideoSizeChange(size) => {
                std::mem::replace(&mut self.video_size, *size) != *size
            }
            DeviceEvent::AppResourcesLoaded => {
                !std::mem::replace(&mut self.app_resources_loaded, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_reports_changes() {
        let mut info = SessionInfo::new(TrackingConfig::default());
        let size = DeviceEvent::CanvasSizeChange(Dimensions::new(640, 480));

        assert!(info.apply(&size));
        assert!(!info.apply(&size));
        assert_eq!(info.canvas_size, Dimensions::new(640, 480));

        assert!(info.apply(&DeviceEvent::AppResourcesLoaded));
        assert!(!info.apply(&DeviceEvent::AppResourcesLoaded));
    }
}
