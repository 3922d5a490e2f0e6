// SPDX-License-Identifier: MPL-2.0

//! Error types for the camera pipeline
//!
//! Session-level failures (the session cannot start) are kept apart from
//! per-module, per-frame failures (the session keeps running, degraded):
//!
//! - [`SessionError`] is returned from `Session::run` and aborts the start
//! - [`StageError`] is recovered by the scheduler and routed to `onException`
//! - [`DuplicateNameError`] is reported per module by the registry

use crate::backends::camera::IncompatibilityReason;
use crate::pipeline::{CallbackKind, SessionState};
use std::fmt;

/// Error value returned by module callbacks
pub type ModuleFault = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by module callbacks
pub type CallbackResult<T = ()> = Result<T, ModuleFault>;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// A module with the same name is already registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateNameError {
    pub name: String,
}

/// A module's `onBeforeRun` future failed, panicked or timed out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInitError {
    pub module: String,
    pub reason: String,
}

/// Capture device open/close failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or platform denied camera access
    PermissionDenied,
    /// No device matching the requested camera configuration
    DeviceNotFound(String),
    /// Device exists but could not be opened
    OpenFailed(String),
    /// Device failed to release its resources
    CloseFailed(String),
}

/// A module callback failed while the session was running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    /// Name of the failing module
    pub module: String,
    /// Callback that failed
    pub callback: CallbackKind,
    /// Error message (or panic payload)
    pub message: String,
}

/// The device/environment compatibility check failed before `run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibleEnvironmentError {
    pub reasons: Vec<IncompatibilityReason>,
}

/// Failures that prevent a session from starting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Environment compatibility check failed
    IncompatibleEnvironment(IncompatibleEnvironmentError),
    /// A module's `onBeforeRun` failed
    ModuleInit(ModuleInitError),
    /// The capture device could not be opened
    Capture(CaptureError),
    /// `run` was called while the session was not stopped
    InvalidState(SessionState),
    /// `stop` was requested while the session was starting
    Cancelled,
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading the config file failed
    Io(String),
    /// The config file is not valid JSON for the expected schema
    Parse(String),
}

impl fmt::Display for DuplicateNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module '{}' is already registered", self.name)
    }
}

impl fmt::Display for ModuleInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Module '{}' failed to initialize: {}",
            self.module, self.reason
        )
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "Camera permission denied"),
            CaptureError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            CaptureError::OpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CaptureError::CloseFailed(msg) => write!(f, "Failed to close camera: {}", msg),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Module '{}' failed in {}: {}",
            self.module, self.callback, self.message
        )
    }
}

impl fmt::Display for IncompatibleEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.reasons.iter().map(|r| r.to_string()).collect();
        write!(f, "Incompatible environment: {}", reasons.join(", "))
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::IncompatibleEnvironment(e) => write!(f, "{}", e),
            SessionError::ModuleInit(e) => write!(f, "Module init error: {}", e),
            SessionError::Capture(e) => write!(f, "Capture error: {}", e),
            SessionError::InvalidState(state) => {
                write!(f, "Cannot run session while {}", state)
            }
            SessionError::Cancelled => write!(f, "Session start cancelled by stop"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Failed to read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for DuplicateNameError {}
impl std::error::Error for ModuleInitError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for StageError {}
impl std::error::Error for IncompatibleEnvironmentError {}
impl std::error::Error for ConfigError {}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::IncompatibleEnvironment(e) => Some(e),
            SessionError::ModuleInit(e) => Some(e),
            SessionError::Capture(e) => Some(e),
            SessionError::InvalidState(_) | SessionError::Cancelled => None,
        }
    }
}

impl From<ModuleInitError> for SessionError {
    fn from(err: ModuleInitError) -> Self {
        SessionError::ModuleInit(err)
    }
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        SessionError::Capture(err)
    }
}

impl From<IncompatibleEnvironmentError> for SessionError {
    fn from(err: IncompatibleEnvironmentError) -> Self {
        SessionError::IncompatibleEnvironment(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
