// SPDX-License-Identifier: GPL-3.0-only

//! Thread-safe session control
//!
//! Every mutating call is queued and applied by the session at its next tick
//! boundary (or at the start of `run`). Reads reflect the state as of the
//! last applied transition.

use super::module::{ModuleRef, PipelineModule};
use super::state::{Request, SessionState, Shared};
use crate::backends::camera::DeviceEvent;
use crate::backends::tracking::{CameraProjectionUpdate, TrackingOptions};
use std::sync::Arc;

/// Cloneable, `Send` handle to a [`Session`](super::Session)
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Paused
    }

    /// Whether a stop has been queued and not applied yet
    pub fn stop_pending(&self) -> bool {
        self.shared.stop_requested()
    }

    /// Queue a module install; a duplicate name is logged and dropped
    pub fn add_module(&self, module: PipelineModule) {
        self.shared.push(Request::Add(module));
    }

    pub fn remove_module(&self, target: impl Into<ModuleRef>) {
        self.shared.push(Request::Remove(target.into()));
    }

    pub fn clear_modules(&self) {
        self.shared.push(Request::Clear);
    }

    pub fn pause(&self) {
        self.shared.push(Request::Pause);
    }

    pub fn resume(&self) {
        self.shared.push(Request::Resume);
    }

    /// Queue a stop
    ///
    /// A running frame finishes its current stage and starts no other; a
    /// session still starting gives up and `run` returns `Cancelled`.
    pub fn stop(&self) {
        self.shared.push(Request::Stop);
    }

    pub fn notify(&self, event: DeviceEvent) {
        self.shared.push(Request::Notify(event));
    }

    pub fn update_camera_projection_matrix(&self, update: CameraProjectionUpdate) {
        self.shared.push(Request::UpdateCamera(update));
    }

    pub fn recenter(&self) {
        self.shared.push(Request::Recenter);
    }

    pub fn configure_tracking(&self, options: TrackingOptions) {
        self.shared.push(Request::ConfigureTracking(options));
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .finish()
    }
}
