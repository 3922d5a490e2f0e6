// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic tracking engine
//!
//! Produces plausible snapshots without any computer vision: the device sits
//! at the configured origin and slowly drifts until recentered. Hit tests
//! return the canned estimates registered with [`SyntheticTracker::with_estimate`].
//! Used by the CLI simulation and by tests.

use super::types::*;
use super::{FrameInput, TrackingEngine};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Drift added to the device position every tracked frame
const DRIFT_PER_FRAME: f32 = 0.001;

/// Counters observable from outside while the engine is owned by a session
#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    pub frames_processed: u64,
    pub recenters: u32,
    pub suspended: bool,
    pub config: TrackingConfig,
}

pub struct SyntheticTracker {
    /// Frames processed before the first snapshot is produced
    warmup_frames: u64,
    origin: Vec3,
    facing: Quat,
    drift: f32,
    estimates: Vec<Estimated3DPosition>,
    world_points: Vec<WorldPoint>,
    visible_targets: Vec<ImageTargetDetection>,
    config: TrackingConfig,
    stats: Arc<Mutex<TrackerStats>>,
}

impl Default for SyntheticTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticTracker {
    pub fn new() -> Self {
        Self {
            warmup_frames: 0,
            origin: Vec3::ZERO,
            facing: Quat::IDENTITY,
            drift: 0.0,
            estimates: Vec::new(),
            world_points: vec![
                WorldPoint {
                    id: 1,
                    confidence: 0.9,
                    position: Vec3::new(0.0, 0.0, -1.0),
                },
                WorldPoint {
                    id: 2,
                    confidence: 0.6,
                    position: Vec3::new(0.5, 0.0, -1.5),
                },
            ],
            visible_targets: Vec::new(),
            config: TrackingConfig::default(),
            stats: Arc::new(Mutex::new(TrackerStats::default())),
        }
    }

    /// Produce no snapshot for the first `frames` frames
    pub fn with_warmup(mut self, frames: u64) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Register an estimate returned by every hit test
    pub fn with_estimate(mut self, estimate: Estimated3DPosition) -> Self {
        self.estimates.push(estimate);
        self
    }

    /// Report `target` as detected whenever its name is an active image target
    pub fn with_visible_target(mut self, target: ImageTargetDetection) -> Self {
        self.visible_targets.push(target);
        self
    }

    /// Shared view of the engine's counters
    pub fn stats(&self) -> Arc<Mutex<TrackerStats>> {
        Arc::clone(&self.stats)
    }

    fn lock_stats(&self) -> MutexGuard<'_, TrackerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TrackingEngine for SyntheticTracker {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn configure(&mut self, config: &TrackingConfig) {
        debug!(?config, "Configuring synthetic tracker");
        self.config = config.clone();
        self.lock_stats().config = config.clone();
    }

    fn process_frame(&mut self, frame: &FrameInput) -> Option<TrackingResult> {
        let processed = {
            let mut stats = self.lock_stats();
            stats.frames_processed += 1;
            stats.frames_processed
        };
        if processed <= self.warmup_frames {
            trace!(frame = frame.frame_index, "Tracker warming up");
            return None;
        }

        let world_tracking = !self.config.disable_world_tracking;
        if world_tracking {
            self.drift += DRIFT_PER_FRAME;
        }

        let detected_targets = self
            .visible_targets
            .iter()
            .filter(|t| self.config.image_targets.contains(&t.name))
            .cloned()
            .collect();

        Some(TrackingResult {
            timestamp_ms: frame.timestamp_ms,
            position: Vec3::new(self.origin.x + self.drift, self.origin.y, self.origin.z),
            rotation: self.facing,
            status: if world_tracking {
                TrackingStatus::Normal
            } else {
                TrackingStatus::Limited
            },
            lighting: Some(Lighting {
                exposure: 0.0,
                temperature: 5500.0,
            }),
            world_points: world_tracking.then(|| self.world_points.clone()),
            detected_targets,
        })
    }

    fn hit_test(
        &self,
        snapshot: &TrackingResult,
        query: &HitTestQuery,
    ) -> Vec<Estimated3DPosition> {
        if self.config.disable_world_tracking {
            return Vec::new();
        }

        // Offset the canned positions by the query point so different feed
        // coordinates land on different scene positions.
        self.estimates
            .iter()
            .map(|e| {
                let position = Vec3::new(
                    e.position.x + (query.x - 0.5),
                    e.position.y - (query.y - 0.5),
                    e.position.z,
                );
                Estimated3DPosition {
                    kind: e.kind,
                    position,
                    rotation: e.rotation,
                    distance: snapshot.position.distance(&position),
                }
            })
            .collect()
    }

    fn recenter(&mut self, origin: Vec3, facing: Quat) {
        debug!(?origin, "Recentering synthetic tracker");
        self.origin = origin;
        self.facing = facing;
        self.drift = 0.0;
        self.lock_stats().recenters += 1;
    }

    fn suspend(&mut self) {
        self.lock_stats().suspended = true;
    }

    fn resume(&mut self) {
        self.lock_stats().suspended = false;
    }
}
