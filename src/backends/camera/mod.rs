// SPDX-License-Identifier: MPL-2.0

//! Capture device abstraction
//!
//! The pipeline never talks to camera hardware directly. A session owns one
//! [`CaptureDevice`] and calls it at state transitions:
//!
//! ```text
//! ┌──────────────────────┐
//! │ Session (run/pause/  │
//! │ resume/stop)         │
//! └──────────┬───────────┘
//!            │ open / suspend / resume / close
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureDevice trait  │  ← Common interface
//! └──────────┬───────────┘
//!            │
//!            ▼
//!   ┌────────────────┐
//!   │ Virtual device │  ← Scriptable implementation
//!   └────────────────┘
//! ```
//!
//! Device events (permission status, orientation, canvas/video size) flow the
//! other way, through `Session::notify`.

pub mod frame_loop;
pub mod types;

pub use frame_loop::{FrameLoopController, LoopAction};
pub use types::*;

use crate::backends::virtual_camera::VirtualCaptureDevice;
use crate::errors::CaptureResult;

/// Camera capture device used by a session
pub trait CaptureDevice: Send {
    /// Human readable backend name (for logging)
    fn name(&self) -> &str;

    /// Check whether the environment can run the pipeline at all
    ///
    /// Called by `run` before anything else; an incompatible result aborts
    /// the start without dispatching any lifecycle event.
    fn compatibility(&self) -> Compatibility {
        Compatibility::default()
    }

    /// Estimate of the host device
    fn device_estimate(&self) -> DeviceEstimate {
        DeviceEstimate::default()
    }

    /// Open the camera stream described by `request`
    ///
    /// # Returns
    /// * `Ok(CaptureHandle)` - Stream opened
    /// * `Err(CaptureError)` - Fatal to the session start
    fn open(&mut self, request: &CaptureRequest) -> CaptureResult<CaptureHandle>;

    /// Close a previously opened stream and release its resources
    fn close(&mut self, handle: CaptureHandle) -> CaptureResult<()>;

    /// Suspend frame delivery while the session is paused
    fn suspend(&mut self, handle: &CaptureHandle) {
        let _ = handle;
    }

    /// Resume frame delivery after a pause
    fn resume(&mut self, handle: &CaptureHandle) {
        let _ = handle;
    }
}

/// Get the default capture device (virtual)
pub fn get_default_device() -> Box<dyn CaptureDevice> {
    Box::new(VirtualCaptureDevice::new())
}
