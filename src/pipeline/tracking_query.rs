// SPDX-License-Identifier: GPL-3.0-only

//! Queries against the committed tracking snapshot
//!
//! Each tick the engine produces a snapshot which is staged for the frame
//! and committed once `onUpdate` has run. Hit tests only ever see the last
//! committed snapshot, so a module calling `hit_test` from `onUpdate` gets a
//! stable answer for the whole stage.

use crate::backends::tracking::{
    CameraGeometry, CameraProjectionUpdate, Estimated3DPosition, FrameInput, HitTestQuery,
    HitTestType, TrackingConfig, TrackingEngine, TrackingOptions, TrackingResult,
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub struct TrackingQuery {
    engine: Box<dyn TrackingEngine>,
    config: TrackingConfig,
    geometry: CameraGeometry,
    pending_geometry: Option<CameraProjectionUpdate>,
    staged: Option<Arc<TrackingResult>>,
    committed: Option<Arc<TrackingResult>>,
}

impl TrackingQuery {
    pub(crate) fn new(
        mut engine: Box<dyn TrackingEngine>,
        config: TrackingConfig,
        geometry: CameraGeometry,
    ) -> Self {
        engine.configure(&config);
        Self {
            engine,
            config,
            geometry,
            pending_geometry: None,
            staged: None,
            committed: None,
        }
    }

    /// Estimate 3D positions for a point on the camera feed
    ///
    /// `x` and `y` are normalized feed coordinates in `[0, 1]`; anything
    /// outside that range yields no estimates. An empty `included_types`
    /// means every type. At most one estimate per type is returned, nearest
    /// first.
    pub fn hit_test(
        &self,
        x: f32,
        y: f32,
        included_types: &[HitTestType],
    ) -> Vec<Estimated3DPosition> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !in_range(x) || !in_range(y) {
            debug!(x, y, "Hit test outside the camera feed");
            return Vec::new();
        }
        let Some(snapshot) = self.committed.as_ref() else {
            return Vec::new();
        };

        let types: Vec<HitTestType> = if included_types.is_empty() {
            HitTestType::ALL.to_vec()
        } else {
            included_types.to_vec()
        };
        let query = HitTestQuery {
            x,
            y,
            included_types: types.clone(),
        };

        let mut seen = Vec::new();
        let mut results: Vec<Estimated3DPosition> = self
            .engine
            .hit_test(snapshot, &query)
            .into_iter()
            .filter(|e| {
                if types.contains(&e.kind) && !seen.contains(&e.kind) {
                    seen.push(e.kind);
                    true
                } else {
                    false
                }
            })
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results
    }

    /// Geometry in effect for the current frame
    pub fn geometry(&self) -> CameraGeometry {
        self.geometry
    }

    /// Last committed snapshot
    pub fn latest(&self) -> Option<Arc<TrackingResult>> {
        self.committed.clone()
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Queue a geometry change for the next frame
    ///
    /// Several updates before a frame fold together; later fields win.
    pub(crate) fn update_camera_projection_matrix(&mut self, update: CameraProjectionUpdate) {
        let merged = match self.pending_geometry.take() {
            Some(prev) => CameraProjectionUpdate {
                cam: update.cam.or(prev.cam),
                origin: update.origin.or(prev.origin),
                facing: update.facing.or(prev.facing),
            },
            None => update,
        };
        debug!(update = ?merged, "Camera geometry update queued");
        self.pending_geometry = Some(merged);
    }

    /// Map the current device pose back to the configured origin and facing
    pub(crate) fn recenter(&mut self) {
        let mut target = self.geometry;
        if let Some(pending) = &self.pending_geometry {
            target.apply(pending);
        }
        info!(engine = %self.engine.name(), origin = ?target.origin, "Recentering");
        self.engine.recenter(target.origin, target.facing);
    }

    /// Merge `options` into the active configuration
    ///
    /// Returns `false` if a world tracking change was refused; the other
    /// fields are applied either way.
    pub(crate) fn configure(
        &mut self,
        options: &TrackingOptions,
        allow_world_tracking_change: bool,
    ) -> bool {
        let accepted = self.config.merge(options, allow_world_tracking_change);
        if !accepted {
            warn!("disable_world_tracking can only change while the session is stopped");
        }
        self.engine.configure(&self.config);
        accepted
    }

    /// Apply pending geometry and produce this frame's snapshot
    ///
    /// If the engine has nothing new, the last committed snapshot is reused.
    pub(crate) fn begin_frame(
        &mut self,
        frame_index: u64,
        timestamp_ms: f64,
    ) -> (CameraGeometry, Option<Arc<TrackingResult>>) {
        if let Some(update) = self.pending_geometry.take() {
            self.geometry.apply(&update);
            debug!(geometry = ?self.geometry, "Camera geometry applied");
        }

        let input = FrameInput {
            timestamp_ms,
            frame_index,
            geometry: self.geometry,
        };
        let reality = match self.engine.process_frame(&input) {
            Some(result) => Some(Arc::new(self.config.filter_extras(result))),
            None => {
                trace!(frame = frame_index, "No new tracking result");
                self.committed.clone()
            }
        };
        self.staged = reality.clone();
        (self.geometry, reality)
    }

    /// Publish the staged snapshot to hit tests
    pub(crate) fn commit(&mut self) {
        if let Some(snapshot) = self.staged.take() {
            self.committed = Some(snapshot);
        }
    }

    /// Drop the staged snapshot without publishing it
    pub(crate) fn discard_staged(&mut self) {
        self.staged = None;
    }

    pub(crate) fn suspend(&mut self) {
        self.engine.suspend();
    }

    pub(crate) fn resume(&mut self) {
        self.engine.resume();
    }

    /// Forget every snapshot; used when the session stops
    pub(crate) fn reset(&mut self) {
        self.staged = None;
        self.committed = None;
    }
}

impl std::fmt::Debug for TrackingQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingQuery")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("geometry", &self.geometry)
            .field("has_snapshot", &self.committed.is_some())
            .finish()
    }
}
