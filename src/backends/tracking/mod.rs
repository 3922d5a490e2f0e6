// SPDX-License-Identifier: GPL-3.0-only

//! Tracking engine abstraction
//!
//! Pose estimation and feature detection happen outside this crate. The
//! session feeds the engine once per tick and keeps the most recent
//! [`TrackingResult`] it returns as the committed snapshot for queries.

pub mod synthetic;
pub mod types;

pub use synthetic::{SyntheticTracker, TrackerStats};
pub use types::*;

/// Per-frame input handed to the tracking engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub timestamp_ms: f64,
    pub frame_index: u64,
    pub geometry: CameraGeometry,
}

/// 6-DoF tracking engine used by a session
pub trait TrackingEngine: Send {
    /// Human readable engine name (for logging)
    fn name(&self) -> &str;

    /// Apply a new effective configuration
    fn configure(&mut self, config: &TrackingConfig);

    /// Produce the snapshot for this frame, or `None` if tracking has no
    /// result yet
    fn process_frame(&mut self, frame: &FrameInput) -> Option<TrackingResult>;

    /// Estimate 3D positions for a point on the camera feed against a
    /// committed snapshot
    fn hit_test(&self, snapshot: &TrackingResult, query: &HitTestQuery)
    -> Vec<Estimated3DPosition>;

    /// Map the current device pose back to `origin`/`facing` and discard
    /// accumulated drift
    fn recenter(&mut self, origin: Vec3, facing: Quat);

    /// Stop tracking while the session is paused
    fn suspend(&mut self) {}

    /// Restart tracking after a pause
    fn resume(&mut self) {}
}

/// Get the default tracking engine (synthetic)
pub fn get_default_engine() -> Box<dyn TrackingEngine> {
    Box::new(SyntheticTracker::new())
}
