// SPDX-License-Identifier: GPL-3.0-only

//! Pose, geometry and hit-test types shared with the tracking engine

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FAR_CLIP_PLANE, DEFAULT_NEAR_CLIP_PLANE, DEFAULT_PIXEL_RECT_HEIGHT,
    DEFAULT_PIXEL_RECT_WIDTH,
};

/// 3D vector in scene units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Display projection parameters of the rendering camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionCamera {
    /// Width of the canvas that displays the camera feed
    pub pixel_rect_width: u32,
    /// Height of the canvas that displays the camera feed
    pub pixel_rect_height: u32,
    /// Closest visible distance
    pub near_clip_plane: f32,
    /// Farthest visible distance
    pub far_clip_plane: f32,
}

impl Default for ProjectionCamera {
    fn default() -> Self {
        Self {
            pixel_rect_width: DEFAULT_PIXEL_RECT_WIDTH,
            pixel_rect_height: DEFAULT_PIXEL_RECT_HEIGHT,
            near_clip_plane: DEFAULT_NEAR_CLIP_PLANE,
            far_clip_plane: DEFAULT_FAR_CLIP_PLANE,
        }
    }
}

/// Display geometry plus the camera's starting pose in the scene
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraGeometry {
    pub camera: ProjectionCamera,
    /// Starting position of the camera in the scene
    pub origin: Vec3,
    /// Starting direction of the camera in the scene
    pub facing: Quat,
}

/// Partial update for [`CameraGeometry`]; `None` fields keep their value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraProjectionUpdate {
    pub cam: Option<ProjectionCamera>,
    pub origin: Option<Vec3>,
    pub facing: Option<Quat>,
}

impl CameraGeometry {
    /// Apply the fields present in `update`
    pub fn apply(&mut self, update: &CameraProjectionUpdate) {
        if let Some(cam) = update.cam {
            self.camera = cam;
        }
        if let Some(origin) = update.origin {
            self.origin = origin;
        }
        if let Some(facing) = update.facing {
            self.facing = facing;
        }
    }
}

/// Data source used to estimate a hit-test position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitTestType {
    FeaturePoint,
    EstimatedSurface,
    DetectedSurface,
    Unspecified,
}

impl HitTestType {
    pub const ALL: [HitTestType; 4] = [
        HitTestType::FeaturePoint,
        HitTestType::EstimatedSurface,
        HitTestType::DetectedSurface,
        HitTestType::Unspecified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HitTestType::FeaturePoint => "FEATURE_POINT",
            HitTestType::EstimatedSurface => "ESTIMATED_SURFACE",
            HitTestType::DetectedSurface => "DETECTED_SURFACE",
            HitTestType::Unspecified => "UNSPECIFIED",
        }
    }
}

impl std::fmt::Display for HitTestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HitTestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HitTestType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown hit test type '{}'", s))
    }
}

/// A hit-test request in normalized camera-feed coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct HitTestQuery {
    /// 0 = left edge, 1 = right edge
    pub x: f32,
    /// 0 = top edge, 1 = bottom edge
    pub y: f32,
    pub included_types: Vec<HitTestType>,
}

/// Estimated 3D position of a point on the camera feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimated3DPosition {
    #[serde(rename = "type")]
    pub kind: HitTestType,
    pub position: Vec3,
    pub rotation: Quat,
    /// Distance from the device
    pub distance: f32,
}

/// Quality of the current tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    #[default]
    Limited,
    Normal,
}

/// Estimated scene lighting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    /// Exposure adjustment in [-1, 1]
    pub exposure: f32,
    /// Color temperature in Kelvin
    pub temperature: f32,
}

/// A tracked 3D feature point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPoint {
    pub id: u64,
    pub confidence: f32,
    pub position: Vec3,
}

/// An image target found in the current frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTargetDetection {
    pub name: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

/// Snapshot of the tracking engine's state for one frame
///
/// Snapshots are immutable once produced; the session swaps whole snapshots
/// between frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingResult {
    pub timestamp_ms: f64,
    /// Camera position in the scene
    pub position: Vec3,
    /// Camera rotation in the scene
    pub rotation: Quat,
    pub status: TrackingStatus,
    pub lighting: Option<Lighting>,
    pub world_points: Option<Vec<WorldPoint>>,
    pub detected_targets: Vec<ImageTargetDetection>,
}

/// Partial tracking configuration; `None` fields keep their value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingOptions {
    /// Expose `reality.lighting` to modules
    pub enable_lighting: Option<bool>,
    /// Expose `reality.world_points` to modules
    pub enable_world_points: Option<bool>,
    /// Turn off SLAM tracking; only honored while the session is stopped
    pub disable_world_tracking: Option<bool>,
    /// Replaces all active image targets
    pub image_targets: Option<Vec<String>>,
}

/// Effective tracking configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enable_lighting: bool,
    pub enable_world_points: bool,
    pub disable_world_tracking: bool,
    pub image_targets: Vec<String>,
}

impl TrackingConfig {
    /// Merge `options` into this config
    ///
    /// `disable_world_tracking` is only applied when `allow_world_tracking_change`
    /// is set. Returns `false` if a requested change was refused.
    pub fn merge(&mut self, options: &TrackingOptions, allow_world_tracking_change: bool) -> bool {
        if let Some(v) = options.enable_lighting {
            self.enable_lighting = v;
        }
        if let Some(v) = options.enable_world_points {
            self.enable_world_points = v;
        }
        if let Some(targets) = &options.image_targets {
            self.image_targets = targets.clone();
        }
        match options.disable_world_tracking {
            Some(v) if v != self.disable_world_tracking => {
                if allow_world_tracking_change {
                    self.disable_world_tracking = v;
                    true
                } else {
                    false
                }
            }
            _ => true,
        }
    }

    /// Remove the optional extras this config does not enable
    pub fn filter_extras(&self, mut result: TrackingResult) -> TrackingResult {
        if !self.enable_lighting {
            result.lighting = None;
        }
        if !self.enable_world_points {
            result.world_points = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_partial_update() {
        let mut geometry = CameraGeometry::default();
        let original_cam = geometry.camera;

        geometry.apply(&CameraProjectionUpdate {
            origin: Some(Vec3::new(0.0, 2.0, 0.0)),
            ..Default::default()
        });

        assert_eq!(geometry.origin, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(geometry.facing, Quat::IDENTITY);
        assert_eq!(geometry.camera, original_cam);
    }

    #[test]
    fn test_hit_test_type_parse() {
        assert_eq!(
            "feature_point".parse::<HitTestType>().unwrap(),
            HitTestType::FeaturePoint
        );
        assert!("SOMETHING".parse::<HitTestType>().is_err());
    }

    #[test]
    fn test_world_tracking_change_refused_while_running() {
        let mut config = TrackingConfig::default();
        let accepted = config.merge(
            &TrackingOptions {
                disable_world_tracking: Some(true),
                image_targets: Some(vec!["poster".to_string()]),
                ..Default::default()
            },
            false,
        );

        assert!(!accepted);
        assert!(!config.disable_world_tracking);
        // Other fields still apply
        assert_eq!(config.image_targets, vec!["poster".to_string()]);
    }

    #[test]
    fn test_filter_extras() {
        let config = TrackingConfig {
            enable_lighting: true,
            ..Default::default()
        };
        let result = TrackingResult {
            timestamp_ms: 0.0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            status: TrackingStatus::Normal,
            lighting: Some(Lighting {
                exposure: 0.1,
                temperature: 5600.0,
            }),
            world_points: Some(Vec::new()),
            detected_targets: Vec::new(),
        };

        let filtered = config.filter_extras(result);
        assert!(filtered.lighting.is_some());
        assert!(filtered.world_points.is_none());
    }
}
