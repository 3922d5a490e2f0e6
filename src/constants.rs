// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use crate::backends::camera::Dimensions;
use std::time::Duration;

/// Default canvas width used for the projection camera
pub const DEFAULT_PIXEL_RECT_WIDTH: u32 = 1280;

/// Default canvas height used for the projection camera
pub const DEFAULT_PIXEL_RECT_HEIGHT: u32 = 720;

/// Default near clip plane in scene units
pub const DEFAULT_NEAR_CLIP_PLANE: f32 = 0.01;

/// Default far clip plane in scene units
pub const DEFAULT_FAR_CLIP_PLANE: f32 = 1000.0;

/// Frame size reported by the virtual capture device
pub const DEFAULT_VIDEO_SIZE: Dimensions = Dimensions {
    width: 1280,
    height: 720,
};

/// Target frame rate of the session's own run loop
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Upper bound accepted for the run loop frame rate
pub const MAX_TARGET_FPS: u32 = 240;

/// Frame interval for a target frame rate (clamped to `1..=MAX_TARGET_FPS`)
pub fn frame_interval(target_fps: u32) -> Duration {
    let fps = target_fps.clamp(1, MAX_TARGET_FPS);
    Duration::from_secs_f64(1.0 / fps as f64)
}
