// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle
//!
//! ```text
//!            run()                 pause()
//! Stopped ──────────▶ Starting ──▶ Running ◀────────▶ Paused
//!    ▲                   │           │     resume()     │
//!    └───────────────────┴───────────┴──────────────────┘
//!                          stop()
//! ```
//!
//! The session owns the module registry, the capture device and the
//! tracking engine. Everything runs on the thread that owns the session;
//! other threads talk to it through a [`SessionHandle`].

use super::dispatcher::{LifecycleDispatcher, LifecycleEvent, join_before_run};
use super::handle::SessionHandle;
use super::info::SessionInfo;
use super::module::{ModuleHandle, ModuleRef, PipelineModule};
use super::registry::{Attachment, BatchAddReport, ModuleRegistry};
use super::scheduler::{FrameScheduler, TickReport};
use super::state::{Request, SessionState, Shared};
use super::tracking_query::TrackingQuery;
use crate::backends::camera::{
    CameraStatus, CaptureDevice, CaptureHandle, CaptureRequest, Compatibility, DeviceEstimate,
    DeviceEvent, FrameLoopController, LoopAction,
};
use crate::backends::tracking::{
    CameraProjectionUpdate, Estimated3DPosition, HitTestType, TrackingEngine, TrackingOptions,
};
use crate::config::{Config, RunOptions};
use crate::constants;
use crate::errors::{
    DuplicateNameError, IncompatibleEnvironmentError, SessionError, SessionResult, StageError,
};
use futures::future::{Either, select};
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// A camera pipeline session
pub struct Session {
    shared: Arc<Shared>,
    registry: ModuleRegistry,
    dispatcher: LifecycleDispatcher,
    scheduler: FrameScheduler,
    tracking: TrackingQuery,
    device: Box<dyn CaptureDevice>,
    capture: Option<CaptureHandle>,
    info: SessionInfo,
    before_run_timeout: Option<Duration>,
    target_fps: u32,
}

impl Session {
    /// Create a stopped session with no modules
    pub fn new(
        config: &Config,
        device: Box<dyn CaptureDevice>,
        engine: Box<dyn TrackingEngine>,
    ) -> Self {
        info!(
            device = %device.name(),
            engine = %engine.name(),
            version = %crate::version(),
            "Creating session"
        );
        Self {
            shared: Arc::new(Shared::default()),
            registry: ModuleRegistry::new(),
            dispatcher: LifecycleDispatcher::new(),
            scheduler: FrameScheduler::new(),
            tracking: TrackingQuery::new(engine, config.tracking.clone(), config.geometry),
            device,
            capture: None,
            info: SessionInfo::new(config.tracking.clone()),
            before_run_timeout: config.before_run_timeout(),
            target_fps: config.target_fps,
        }
    }

    /// Create a session backed by the virtual camera and synthetic tracker
    pub fn with_default_backends(config: &Config) -> Self {
        Self::new(
            config,
            crate::backends::camera::get_default_device(),
            crate::backends::tracking::get_default_engine(),
        )
    }

    /// Handle for controlling the session from other threads
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.shared))
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Paused
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn tracking(&self) -> &TrackingQuery {
        &self.tracking
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Frame rate used by [`spawn_run_loop`]
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Number of faults routed to `onException` since the session was created
    pub fn faults_reported(&self) -> u64 {
        self.dispatcher.faults_reported()
    }

    pub fn compatibility(&self) -> Compatibility {
        self.device.compatibility()
    }

    pub fn device_estimate(&self) -> DeviceEstimate {
        self.device.device_estimate()
    }

    // ===== Module registry =====

    /// Install a module
    ///
    /// If the session is not stopped the module is attached right away and
    /// takes part from the next stage on.
    pub fn add_module(&mut self, module: PipelineModule) -> Result<ModuleHandle, DuplicateNameError> {
        let index = match self.registry.insert(module) {
            Ok(index) => index,
            Err(e) => {
                debug!(module = %e.name, "Rejected duplicate module");
                return Err(e);
            }
        };
        let handle = self.registry.entry(index).handle();
        if self.state().is_active() {
            self.dispatcher.attach(&mut self.registry, index, &self.info);
        }
        Ok(handle)
    }

    /// Install several modules in order; duplicates are reported per module
    pub fn add_modules(&mut self, modules: impl IntoIterator<Item = PipelineModule>) -> BatchAddReport {
        let mut report = BatchAddReport::default();
        for module in modules {
            match self.add_module(module) {
                Ok(handle) => report.added.push(handle),
                Err(e) => report.rejected.push(e),
            }
        }
        report
    }

    /// Uninstall a module by name or handle
    ///
    /// Returns `false` if no module matched.
    pub fn remove_module(&mut self, target: impl Into<ModuleRef>) -> bool {
        let target = target.into();
        let Some(index) = self.registry.find(&target) else {
            debug!(module = %target.name(), "No such module to remove");
            return false;
        };
        self.dispatcher.detach(&mut self.registry, index, &self.info);
        self.registry.take(index);
        true
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        self.remove_module(name)
    }

    /// Remove the exact registration `handle` refers to
    pub fn remove_by_handle(&mut self, handle: &ModuleHandle) -> bool {
        self.remove_module(handle)
    }

    /// Remove several modules; returns how many were removed
    pub fn remove_modules<I, R>(&mut self, targets: I) -> usize
    where
        I: IntoIterator<Item = R>,
        R: Into<ModuleRef>,
    {
        let mut removed = 0;
        for target in targets {
            if self.remove_module(target) {
                removed += 1;
            }
        }
        removed
    }

    /// Detach and remove every module in registry order
    pub fn clear_modules(&mut self) {
        while !self.registry.is_empty() {
            self.dispatcher.detach(&mut self.registry, 0, &self.info);
            self.registry.take(0);
        }
    }

    pub fn module_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn attachment(&self, name: &str) -> Option<Attachment> {
        self.registry.attachment(name)
    }

    // ===== Lifecycle =====

    /// Start the session
    ///
    /// Checks compatibility, waits for every module's `onBeforeRun`, opens
    /// the capture device, dispatches `onStart` and attaches every module.
    /// Any failure leaves the session stopped. A stop queued through a
    /// [`SessionHandle`] while `onBeforeRun` futures are pending drops them
    /// and returns [`SessionError::Cancelled`]. Needs a tokio runtime only if
    /// a before-run timeout is configured.
    pub async fn run(&mut self, options: RunOptions) -> SessionResult<()> {
        // Requests queued while stopped apply before the start
        self.drain_requests();

        let state = self.state();
        if state != SessionState::Stopped {
            warn!(state = %state, "run() called on a session that is not stopped");
            return Err(SessionError::InvalidState(state));
        }

        let compatibility = self.device.compatibility();
        if !compatibility.is_compatible() {
            warn!(reasons = ?compatibility.reasons, "Environment is not compatible");
            return Err(IncompatibleEnvironmentError {
                reasons: compatibility.reasons,
            }
            .into());
        }

        info!(
            surface = %options.surface.0,
            owns_run_loop = options.owns_run_loop,
            modules = self.registry.len(),
            "Starting session"
        );
        self.shared.set_state(SessionState::Starting);
        self.info.begin_run(&options);

        let (tasks, sync_failure) = self
            .dispatcher
            .collect_before_run(&mut self.registry, &self.info);
        // A queued stop abandons whatever onBeforeRun work is still pending
        let joined = {
            let join = pin!(join_before_run(tasks, self.before_run_timeout));
            let stop = pin!(self.shared.stop_signalled());
            match select(join, stop).await {
                Either::Left((result, _)) => Some(result),
                Either::Right(_) => None,
            }
        };
        let Some(joined) = joined else {
            info!("Stop requested during module initialization");
            self.abort_start();
            self.drain_requests();
            return Err(SessionError::Cancelled);
        };
        if let Err(e) = sync_failure.map_or(joined, Err) {
            error!(error = %e, "Module initialization failed");
            self.abort_start();
            return Err(e.into());
        }

        if self.shared.stop_requested() {
            info!("Stop requested during module initialization");
            self.abort_start();
            self.drain_requests();
            return Err(SessionError::Cancelled);
        }

        self.notify(DeviceEvent::CameraStatusChange(CameraStatus::Requesting));
        let request = CaptureRequest {
            surface: options.surface.clone(),
            use_secondary_graphics_context: options.use_secondary_graphics_context,
            owns_run_loop: options.owns_run_loop,
            camera: options.camera.clone(),
        };
        match self.device.open(&request) {
            Ok(handle) => {
                info!(device = %self.device.name(), size = %handle.video_size, "Capture opened");
                let video_size = handle.video_size;
                self.capture = Some(handle);
                self.notify(DeviceEvent::CameraStatusChange(CameraStatus::HasStream));
                self.notify(DeviceEvent::VideoSizeChange(video_size));
            }
            Err(e) => {
                error!(error = %e, "Failed to open capture device");
                self.notify(DeviceEvent::CameraStatusChange(CameraStatus::Failed(
                    e.to_string(),
                )));
                self.abort_start();
                return Err(e.into());
            }
        }

        self.dispatcher.start_all(&mut self.registry, &self.info);

        if self.shared.stop_requested() {
            info!("Stop requested while starting");
            self.stop();
            self.drain_requests();
            return Err(SessionError::Cancelled);
        }

        self.shared.set_state(SessionState::Running);
        info!(attached = ?self.registry.attached_names(), "Session running");

        // A pause queued while starting applies now
        self.drain_requests();
        Ok(())
    }

    /// Undo a partial start and return to Stopped
    fn abort_start(&mut self) {
        self.dispatcher.detach_all(&mut self.registry, &self.info);
        self.close_capture();
        self.scheduler.discard();
        self.tracking.reset();
        self.shared.set_state(SessionState::Stopped);
    }

    fn close_capture(&mut self) {
        if let Some(handle) = self.capture.take() {
            if let Err(e) = self.device.close(handle) {
                warn!(error = %e, "Failed to close capture device");
            }
        }
    }

    /// Pause a running session
    ///
    /// Suspends the device and tracking; modules stay attached. Returns
    /// `false` if the session was not running.
    ///
    /// The frame in flight is dropped: pausing between [`tick`](Self::tick)
    /// and [`post_render_tick`](Self::post_render_tick) skips that frame's
    /// `onRender`.
    ///
    /// A pause queued through a [`SessionHandle`] while the session is
    /// starting is held until `run` reaches Running, so `onStart` and
    /// `onAttach` always come before `onPaused`.
    pub fn pause(&mut self) -> bool {
        let state = self.state();
        if state != SessionState::Running {
            debug!(state = %state, "Ignoring pause");
            return false;
        }

        self.scheduler.discard();
        self.tracking.discard_staged();
        self.tracking.suspend();
        if let Some(handle) = &self.capture {
            self.device.suspend(handle);
        }
        self.shared.set_state(SessionState::Paused);
        info!("Session paused");
        self.dispatcher
            .dispatch(&mut self.registry, LifecycleEvent::Paused, &self.info);
        true
    }

    /// Resume a paused session; returns `false` if it was not paused
    pub fn resume(&mut self) -> bool {
        let state = self.state();
        if state != SessionState::Paused {
            debug!(state = %state, "Ignoring resume");
            return false;
        }

        if let Some(handle) = &self.capture {
            self.device.resume(handle);
        }
        self.tracking.resume();
        self.shared.set_state(SessionState::Running);
        info!("Session resumed");
        self.dispatcher
            .dispatch(&mut self.registry, LifecycleEvent::Resume, &self.info);
        true
    }

    /// Stop the session
    ///
    /// Every attached module is detached but stays registered, so a later
    /// `run` brings them back. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        self.shared.clear_stop();
        let state = self.state();
        if state == SessionState::Stopped {
            debug!("Session already stopped");
            return false;
        }

        info!(state = %state, "Stopping session");
        self.scheduler.discard();
        self.dispatcher.detach_all(&mut self.registry, &self.info);
        self.close_capture();
        self.tracking.reset();
        self.shared.set_state(SessionState::Stopped);
        true
    }

    /// Stop the session and uninstall every module
    pub fn shutdown(mut self) {
        self.stop();
        self.clear_modules();
        info!("Session shut down");
    }

    // ===== Frames =====

    /// Run the pre-render stages for one frame
    ///
    /// Applies queued requests first. Returns `None` without running any
    /// stage unless the session is running.
    pub fn tick(&mut self, timestamp_ms: f64) -> Option<TickReport> {
        self.drain_requests();
        if self.state() != SessionState::Running {
            trace!(state = %self.state(), "Skipping tick");
            return None;
        }

        if self.info.camera_status == Some(CameraStatus::HasStream) {
            self.notify(DeviceEvent::CameraStatusChange(CameraStatus::HasVideo));
        }

        let report = self.scheduler.run_pre_render(
            &mut self.registry,
            &mut self.dispatcher,
            &mut self.tracking,
            &self.shared,
            timestamp_ms,
        );
        if report.interrupted {
            self.drain_requests();
        }
        Some(report)
    }

    /// Close the current frame, running `onRender` if the session owns its
    /// run loop
    pub fn post_render_tick(&mut self) -> Vec<StageError> {
        let faults = self.scheduler.run_post_render(
            &mut self.registry,
            &mut self.dispatcher,
            &self.shared,
            self.info.owns_run_loop,
        );
        if self.shared.stop_requested() {
            self.drain_requests();
        }
        faults
    }

    // ===== Tracking =====

    /// Merge tracking options into the active configuration
    ///
    /// `disable_world_tracking` only changes while stopped; returns `false`
    /// if such a change was refused. The remaining fields apply regardless.
    pub fn configure_tracking(&mut self, options: TrackingOptions) -> bool {
        let allow = self.state() == SessionState::Stopped;
        let accepted = self.tracking.configure(&options, allow);
        self.info.tracking = self.tracking.config().clone();
        accepted
    }

    /// Hit test against the last committed tracking snapshot
    pub fn hit_test(&self, x: f32, y: f32, included_types: &[HitTestType]) -> Vec<Estimated3DPosition> {
        self.tracking.hit_test(x, y, included_types)
    }

    /// Change display geometry or the starting pose from the next frame on
    pub fn update_camera_projection_matrix(&mut self, update: CameraProjectionUpdate) {
        self.tracking.update_camera_projection_matrix(update);
    }

    /// Reset the device pose to the configured origin and facing
    pub fn recenter(&mut self) {
        self.tracking.recenter();
    }

    // ===== Device events =====

    /// Record a device event and tell attached modules if it changed anything
    pub fn notify(&mut self, event: DeviceEvent) -> bool {
        if !self.info.apply(&event) {
            trace!(?event, "Device event changed nothing");
            return false;
        }
        self.dispatcher.dispatch(
            &mut self.registry,
            LifecycleEvent::from_device(&event),
            &self.info,
        );
        true
    }

    /// Apply every request queued by handles, in FIFO order
    ///
    /// A queued stop is applied before anything else and cancels queued
    /// pause and resume requests.
    fn drain_requests(&mut self) {
        let requests = self.shared.drain();
        if requests.is_empty() {
            return;
        }
        debug!(count = requests.len(), "Applying queued requests");

        let stopping = requests.iter().any(|r| matches!(r, Request::Stop));
        if stopping {
            self.stop();
        }

        for request in requests {
            match request {
                Request::Add(module) => {
                    if let Err(e) = self.add_module(module) {
                        warn!(error = %e, "Queued module rejected");
                    }
                }
                Request::Remove(target) => {
                    self.remove_module(target);
                }
                Request::Clear => self.clear_modules(),
                Request::Pause if !stopping => {
                    self.pause();
                }
                Request::Resume if !stopping => {
                    self.resume();
                }
                Request::Pause | Request::Resume | Request::Stop => {}
                Request::Notify(event) => {
                    self.notify(event);
                }
                Request::UpdateCamera(update) => self.update_camera_projection_matrix(update),
                Request::Recenter => self.recenter(),
                Request::ConfigureTracking(options) => {
                    self.configure_tracking(options);
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state() != SessionState::Stopped {
            debug!("Session dropped while active, stopping");
            self.stop();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("device", &self.device.name())
            .field("tracking", &self.tracking)
            .finish()
    }
}

/// Drive a session that owns its run loop
///
/// Ticks at the session's target frame rate until the session returns to
/// Stopped.
pub fn spawn_run_loop(session: Arc<Mutex<Session>>) -> FrameLoopController {
    let interval = match session.lock() {
        Ok(session) => constants::frame_interval(session.target_fps()),
        Err(_) => constants::frame_interval(constants::DEFAULT_TARGET_FPS),
    };

    FrameLoopController::start("session-run-loop", interval, move |timestamp_ms| {
        let Ok(mut session) = session.lock() else {
            warn!("Session mutex poisoned; stopping run loop");
            return LoopAction::Stop;
        };
        session.tick(timestamp_ms);
        session.post_render_tick();
        if session.state() == SessionState::Stopped {
            debug!("Session stopped; leaving run loop");
            LoopAction::Stop
        } else {
            LoopAction::Continue
        }
    })
}
