// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline modules
//!
//! A module is a name plus a set of optional callback slots. The session
//! only ever invokes the slots that are populated, so a module that only
//! cares about `onUpdate` costs nothing in the other stages.
//!
//! ```ignore
//! let module = PipelineModule::new("reticle")
//!     .on_attach(|info| {
//!         debug!(canvas = %info.canvas_size, "reticle attached");
//!         Ok(())
//!     })
//!     .on_update(|frame| {
//!         let hits = frame.tracking.hit_test(0.5, 0.5, &[HitTestType::FeaturePoint]);
//!         // move the reticle...
//!         Ok(())
//!     });
//! ```

use super::frame::{CpuStage, GpuStage, RenderStage, StageValue, UpdateStage};
use super::info::SessionInfo;
use crate::backends::camera::{CameraStatus, DeviceOrientation, Dimensions};
use crate::errors::{CallbackResult, StageError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;

/// Every callback a module can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Attach,
    Detach,
    BeforeRun,
    Start,
    Paused,
    Resume,
    Exception,
    CameraStatusChange,
    CanvasSizeChange,
    DeviceOrientationChange,
    VideoSizeChange,
    AppResourcesLoaded,
    ProcessGpu,
    ProcessCpu,
    Update,
    Render,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 16] = [
        CallbackKind::Attach,
        CallbackKind::Detach,
        CallbackKind::BeforeRun,
        CallbackKind::Start,
        CallbackKind::Paused,
        CallbackKind::Resume,
        CallbackKind::Exception,
        CallbackKind::CameraStatusChange,
        CallbackKind::CanvasSizeChange,
        CallbackKind::DeviceOrientationChange,
        CallbackKind::VideoSizeChange,
        CallbackKind::AppResourcesLoaded,
        CallbackKind::ProcessGpu,
        CallbackKind::ProcessCpu,
        CallbackKind::Update,
        CallbackKind::Render,
    ];

    /// Callback name as used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::Attach => "onAttach",
            CallbackKind::Detach => "onDetach",
            CallbackKind::BeforeRun => "onBeforeRun",
            CallbackKind::Start => "onStart",
            CallbackKind::Paused => "onPaused",
            CallbackKind::Resume => "onResume",
            CallbackKind::Exception => "onException",
            CallbackKind::CameraStatusChange => "onCameraStatusChange",
            CallbackKind::CanvasSizeChange => "onCanvasSizeChange",
            CallbackKind::DeviceOrientationChange => "onDeviceOrientationChange",
            CallbackKind::VideoSizeChange => "onVideoSizeChange",
            CallbackKind::AppResourcesLoaded => "onAppResourcesLoaded",
            CallbackKind::ProcessGpu => "onProcessGpu",
            CallbackKind::ProcessCpu => "onProcessCpu",
            CallbackKind::Update => "onUpdate",
            CallbackKind::Render => "onRender",
        }
    }

    /// Per-frame stage callbacks (as opposed to lifecycle callbacks)
    pub fn is_stage(&self) -> bool {
        matches!(
            self,
            CallbackKind::ProcessGpu
                | CallbackKind::ProcessCpu
                | CallbackKind::Update
                | CallbackKind::Render
        )
    }
}

impl std::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub(crate) type LifecycleFn = Box<dyn FnMut(&SessionInfo) -> CallbackResult + Send>;
pub(crate) type BeforeRunFn = Box<dyn FnMut(&SessionInfo) -> BeforeRunFuture + Send>;
pub(crate) type ExceptionFn = Box<dyn FnMut(&StageError) -> CallbackResult + Send>;
pub(crate) type CameraStatusFn = Box<dyn FnMut(&CameraStatus) -> CallbackResult + Send>;
pub(crate) type SizeFn = Box<dyn FnMut(Dimensions) -> CallbackResult + Send>;
pub(crate) type OrientationFn = Box<dyn FnMut(DeviceOrientation) -> CallbackResult + Send>;
pub(crate) type GpuFn =
    Box<dyn FnMut(&GpuStage<'_>) -> CallbackResult<Option<StageValue>> + Send>;
pub(crate) type CpuFn =
    Box<dyn FnMut(&CpuStage<'_>) -> CallbackResult<Option<StageValue>> + Send>;
pub(crate) type UpdateFn = Box<dyn FnMut(&UpdateStage<'_>) -> CallbackResult + Send>;
pub(crate) type RenderFn = Box<dyn FnMut(&RenderStage<'_>) -> CallbackResult + Send>;

/// Future returned from `onBeforeRun`
pub type BeforeRunFuture = BoxFuture<'static, CallbackResult>;

/// Callback slots; `None` means the module does not handle that callback
#[derive(Default)]
pub(crate) struct Callbacks {
    pub attach: Option<LifecycleFn>,
    pub detach: Option<LifecycleFn>,
    pub before_run: Option<BeforeRunFn>,
    pub start: Option<LifecycleFn>,
    pub paused: Option<LifecycleFn>,
    pub resume: Option<LifecycleFn>,
    pub exception: Option<ExceptionFn>,
    pub camera_status_change: Option<CameraStatusFn>,
    pub canvas_size_change: Option<SizeFn>,
    pub device_orientation_change: Option<OrientationFn>,
    pub video_size_change: Option<SizeFn>,
    pub app_resources_loaded: Option<LifecycleFn>,
    pub process_gpu: Option<GpuFn>,
    pub process_cpu: Option<CpuFn>,
    pub update: Option<UpdateFn>,
    pub render: Option<RenderFn>,
}

/// A named unit of behavior installed into the pipeline
pub struct PipelineModule {
    name: String,
    pub(crate) callbacks: Callbacks,
}

impl PipelineModule {
    /// Create a module with no callbacks
    ///
    /// The name must be unique within a session.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callbacks: Callbacks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the module provides `kind`
    pub fn has_callback(&self, kind: CallbackKind) -> bool {
        let c = &self.callbacks;
        match kind {
            CallbackKind::Attach => c.attach.is_some(),
            CallbackKind::Detach => c.detach.is_some(),
            CallbackKind::BeforeRun => c.before_run.is_some(),
            CallbackKind::Start => c.start.is_some(),
            CallbackKind::Paused => c.paused.is_some(),
            CallbackKind::Resume => c.resume.is_some(),
            CallbackKind::Exception => c.exception.is_some(),
            CallbackKind::CameraStatusChange => c.camera_status_change.is_some(),
            CallbackKind::CanvasSizeChange => c.canvas_size_change.is_some(),
            CallbackKind::DeviceOrientationChange => c.device_orientation_change.is_some(),
            CallbackKind::VideoSizeChange => c.video_size_change.is_some(),
            CallbackKind::AppResourcesLoaded => c.app_resources_loaded.is_some(),
            CallbackKind::ProcessGpu => c.process_gpu.is_some(),
            CallbackKind::ProcessCpu => c.process_cpu.is_some(),
            CallbackKind::Update => c.update.is_some(),
            CallbackKind::Render => c.render.is_some(),
        }
    }

    /// All callbacks this module provides
    pub fn capabilities(&self) -> Vec<CallbackKind> {
        CallbackKind::ALL
            .into_iter()
            .filter(|kind| self.has_callback(*kind))
            .collect()
    }

    /// Called before the first frame the module takes part in, with the most
    /// recent session information
    pub fn on_attach<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> CallbackResult + Send + 'static,
    {
        self.callbacks.attach = Some(Box::new(f));
        self
    }

    /// Called after the last frame the module takes part in
    pub fn on_detach<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> CallbackResult + Send + 'static,
    {
        self.callbacks.detach = Some(Box::new(f));
        self
    }

    /// Called right after `run`; the session waits for every returned future
    pub fn on_before_run<F, Fut>(mut self, mut f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> Fut + Send + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        self.callbacks.before_run = Some(Box::new(move |info| f(info).boxed()));
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> CallbackResult + Send + 'static,
    {
        self.callbacks.start = Some(Box::new(f));
        self
    }

    pub fn on_paused<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> CallbackResult + Send + 'static,
    {
        self.callbacks.paused = Some(Box::new(f));
        self
    }

    pub fn on_resume<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> CallbackResult + Send + 'static,
    {
        self.callbacks.resume = Some(Box::new(f));
        self
    }

    /// Called with any callback failure; errors returned here are only logged
    pub fn on_exception<F>(mut self, f: F) -> Self
    where
        F: FnMut(&StageError) -> CallbackResult + Send + 'static,
    {
        self.callbacks.exception = Some(Box::new(f));
        self
    }

    pub fn on_camera_status_change<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CameraStatus) -> CallbackResult + Send + 'static,
    {
        self.callbacks.camera_status_change = Some(Box::new(f));
        self
    }

    pub fn on_canvas_size_change<F>(mut self, f: F) -> Self
    where
        F: FnMut(Dimensions) -> CallbackResult + Send + 'static,
    {
        self.callbacks.canvas_size_change = Some(Box::new(f));
        self
    }

    pub fn on_device_orientation_change<F>(mut self, f: F) -> Self
    where
        F: FnMut(DeviceOrientation) -> CallbackResult + Send + 'static,
    {
        self.callbacks.device_orientation_change = Some(Box::new(f));
        self
    }

    pub fn on_video_size_change<F>(mut self, f: F) -> Self
    where
        F: FnMut(Dimensions) -> CallbackResult + Send + 'static,
    {
        self.callbacks.video_size_change = Some(Box::new(f));
        self
    }

    pub fn on_app_resources_loaded<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SessionInfo) -> CallbackResult + Send + 'static,
    {
        self.callbacks.app_resources_loaded = Some(Box::new(f));
        self
    }

    /// Start GPU work for the frame; the returned value is published under
    /// the module's name in `process_gpu`
    pub fn on_process_gpu<F>(mut self, f: F) -> Self
    where
        F: FnMut(&GpuStage<'_>) -> CallbackResult<Option<StageValue>> + Send + 'static,
    {
        self.callbacks.process_gpu = Some(Box::new(f));
        self
    }

    /// Read back GPU results; the returned value is published under the
    /// module's name in `process_cpu`
    pub fn on_process_cpu<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CpuStage<'_>) -> CallbackResult<Option<StageValue>> + Send + 'static,
    {
        self.callbacks.process_cpu = Some(Box::new(f));
        self
    }

    /// Update the scene from any module's stage results
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: FnMut(&UpdateStage<'_>) -> CallbackResult + Send + 'static,
    {
        self.callbacks.update = Some(Box::new(f));
        self
    }

    /// Issue draw commands; only called when the session owns its run loop
    pub fn on_render<F>(mut self, f: F) -> Self
    where
        F: FnMut(&RenderStage<'_>) -> CallbackResult + Send + 'static,
    {
        self.callbacks.render = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for PipelineModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineModule")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Identifies one registration of a module
///
/// Unlike a name, a handle never matches a later module that reuses the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHandle {
    pub(crate) id: u64,
    pub(crate) name: String,
}

impl ModuleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Removal target: a module name or a registration handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRef {
    Name(String),
    Handle(ModuleHandle),
}

impl ModuleRef {
    /// Name the reference points at
    pub fn name(&self) -> &str {
        match self {
            ModuleRef::Name(name) => name,
            ModuleRef::Handle(handle) => &handle.name,
        }
    }
}

impl From<&str> for ModuleRef {
    fn from(name: &str) -> Self {
        ModuleRef::Name(name.to_string())
    }
}

impl From<String> for ModuleRef {
    fn from(name: String) -> Self {
        ModuleRef::Name(name)
    }
}

impl From<ModuleHandle> for ModuleRef {
    fn from(handle: ModuleHandle) -> Self {
        ModuleRef::Handle(handle)
    }
}

impl From<&ModuleHandle> for ModuleRef {
    fn from(handle: &ModuleHandle) -> Self {
        ModuleRef::Handle(handle.clone())
    }
}
