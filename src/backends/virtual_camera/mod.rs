// SPDX-License-Identifier: GPL-3.0-only

//! Virtual capture device
//!
//! A capture device that opens instantly and delivers no pixels. Failure
//! modes (open errors, incompatible environments) can be scripted so the
//! session's start/stop paths can be exercised without hardware.

use crate::backends::camera::{
    CaptureDevice, CaptureHandle, CaptureRequest, Compatibility, Dimensions,
    IncompatibilityReason,
};
use crate::constants::DEFAULT_VIDEO_SIZE;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Counters observable from outside while the device is owned by a session
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub opens: u32,
    pub closes: u32,
    pub suspends: u32,
    pub resumes: u32,
    /// Request passed to the most recent `open`
    pub last_request: Option<CaptureRequest>,
    pub is_open: bool,
}

pub struct VirtualCaptureDevice {
    video_size: Dimensions,
    open_error: Option<CaptureError>,
    compatibility: Compatibility,
    current: Option<CaptureHandle>,
    stats: Arc<Mutex<CaptureStats>>,
}

impl Default for VirtualCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualCaptureDevice {
    pub fn new() -> Self {
        Self {
            video_size: DEFAULT_VIDEO_SIZE,
            open_error: None,
            compatibility: Compatibility::default(),
            current: None,
            stats: Arc::new(Mutex::new(CaptureStats::default())),
        }
    }

    /// Report frames of the given size
    pub fn with_video_size(mut self, size: Dimensions) -> Self {
        self.video_size = size;
        self
    }

    /// Make every `open` fail with `error`
    pub fn with_open_error(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Report the environment as incompatible
    pub fn with_incompatibility(mut self, reasons: Vec<IncompatibilityReason>) -> Self {
        self.compatibility.reasons = reasons;
        self
    }

    /// Shared view of the device's counters
    pub fn stats(&self) -> Arc<Mutex<CaptureStats>> {
        Arc::clone(&self.stats)
    }

    fn lock_stats(&self) -> MutexGuard<'_, CaptureStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureDevice for VirtualCaptureDevice {
    fn name(&self) -> &str {
        "virtual"
    }

    fn compatibility(&self) -> Compatibility {
        self.compatibility.clone()
    }

    fn open(&mut self, request: &CaptureRequest) -> CaptureResult<CaptureHandle> {
        {
            let mut stats = self.lock_stats();
            stats.opens += 1;
            stats.last_request = Some(request.clone());
        }

        if let Some(err) = &self.open_error {
            warn!(error = %err, "Virtual camera configured to fail open");
            return Err(err.clone());
        }
        if self.current.is_some() {
            return Err(CaptureError::OpenFailed("device already open".to_string()));
        }

        let handle = CaptureHandle::new(self.video_size);
        info!(
            id = %handle.id,
            size = %self.video_size,
            direction = %request.camera.direction,
            "Virtual camera opened"
        );
        self.current = Some(handle.clone());
        self.lock_stats().is_open = true;
        Ok(handle)
    }

    fn close(&mut self, handle: CaptureHandle) -> CaptureResult<()> {
        match self.current.take() {
            Some(current) if current.id == handle.id => {
                let mut stats = self.lock_stats();
                stats.closes += 1;
                stats.is_open = false;
                info!(id = %handle.id, "Virtual camera closed");
                Ok(())
            }
            other => {
                self.current = other;
                Err(CaptureError::CloseFailed(format!(
                    "unknown capture handle {}",
                    handle.id
                )))
            }
        }
    }

    fn suspend(&mut self, handle: &CaptureHandle) {
        debug!(id = %handle.id, "Virtual camera suspended");
        self.lock_stats().suspends += 1;
    }

    fn resume(&mut self, handle: &CaptureHandle) {
        debug!(id = %handle.id, "Virtual camera resumed");
        self.lock_stats().resumes += 1;
    }
}
