// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the capture device abstraction

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which physical camera to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraDirection {
    /// World-facing camera
    #[default]
    Back,
    /// User-facing camera (selfie)
    Front,
}

impl std::fmt::Display for CameraDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraDirection::Back => write!(f, "back"),
            CameraDirection::Front => write!(f, "front"),
        }
    }
}

/// Desired camera configuration passed to `run`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub direction: CameraDirection,
}

/// Opaque identifier of the drawing surface the camera feed is presented on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Everything the capture device needs to open a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub surface: SurfaceId,
    /// Prefer the secondary (newer) graphics context if available
    pub use_secondary_graphics_context: bool,
    /// The session drives its own run loop
    pub owns_run_loop: bool,
    pub camera: CameraConfig,
}

/// Handle to an open capture stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    pub id: Uuid,
    /// Size of the video frames delivered by the device
    pub video_size: Dimensions,
}

impl CaptureHandle {
    pub fn new(video_size: Dimensions) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_size,
        }
    }
}

/// Progress of the camera permission/stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Requesting,
    HasStream,
    HasVideo,
    Failed(String),
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraStatus::Requesting => write!(f, "requesting"),
            CameraStatus::HasStream => write!(f, "hasStream"),
            CameraStatus::HasVideo => write!(f, "hasVideo"),
            CameraStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Physical orientation of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl DeviceOrientation {
    /// Screen rotation in degrees
    pub fn degrees(&self) -> i32 {
        match self {
            DeviceOrientation::Portrait => 0,
            DeviceOrientation::PortraitUpsideDown => 180,
            DeviceOrientation::LandscapeLeft => 90,
            DeviceOrientation::LandscapeRight => -90,
        }
    }
}

/// Events emitted by the capture device and host environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    CameraStatusChange(CameraStatus),
    DeviceOrientationChange(DeviceOrientation),
    CanvasSizeChange(Dimensions),
    VideoSizeChange(Dimensions),
    AppResourcesLoaded,
}

/// Reasons a device/browser combination cannot run the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncompatibilityReason {
    Unspecified,
    UnsupportedOs,
    UnsupportedBrowser,
    MissingDeviceOrientation,
    MissingUserMedia,
    MissingWebAssembly,
}

impl IncompatibilityReason {
    /// Stable numeric code of the reason
    pub fn code(&self) -> u8 {
        match self {
            IncompatibilityReason::Unspecified => 0,
            IncompatibilityReason::UnsupportedOs => 1,
            IncompatibilityReason::UnsupportedBrowser => 2,
            IncompatibilityReason::MissingDeviceOrientation => 3,
            IncompatibilityReason::MissingUserMedia => 4,
            IncompatibilityReason::MissingWebAssembly => 5,
        }
    }
}

impl std::fmt::Display for IncompatibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IncompatibilityReason::Unspecified => "UNSPECIFIED",
            IncompatibilityReason::UnsupportedOs => "UNSUPPORTED_OS",
            IncompatibilityReason::UnsupportedBrowser => "UNSUPPORTED_BROWSER",
            IncompatibilityReason::MissingDeviceOrientation => "MISSING_DEVICE_ORIENTATION",
            IncompatibilityReason::MissingUserMedia => "MISSING_USER_MEDIA",
            IncompatibilityReason::MissingWebAssembly => "MISSING_WEB_ASSEMBLY",
        };
        write!(f, "{}", name)
    }
}

/// Hints about an in-app browser that caused incompatibility
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncompatibleReasonDetails {
    /// Name of the detected in-app browser (e.g. "Twitter")
    pub in_app_browser: Option<String>,
    /// How to handle the in-app browser
    pub in_app_browser_type: Option<String>,
}

/// Result of the environment compatibility check
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compatibility {
    /// Empty when compatible
    pub reasons: Vec<IncompatibilityReason>,
    pub details: IncompatibleReasonDetails,
}

impl Compatibility {
    pub fn is_compatible(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Best-effort estimate of the user's device. Not reliable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEstimate {
    pub locale: String,
    pub os: String,
    pub os_version: String,
    pub manufacturer: String,
    pub model: String,
}

impl Default for DeviceEstimate {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            os: std::env::consts::OS.to_string(),
            os_version: String::new(),
            manufacturer: String::new(),
            model: String::new(),
        }
    }
}
