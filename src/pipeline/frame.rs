// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame data passed between stages
//!
//! Stage results are type-erased so modules can publish anything (a texture
//! handle, a readback buffer, a detection list). Consumers downcast to the
//! type they expect:
//!
//! ```ignore
//! .on_process_cpu(|stage| {
//!     let depth = stage.process_gpu.get::<DepthReadback>("depth");
//!     ...
//! })
//! ```

use super::tracking_query::TrackingQuery;
use crate::backends::tracking::{CameraGeometry, TrackingResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased output of one module's stage callback
#[derive(Clone)]
pub struct StageValue(Arc<dyn Any + Send + Sync>);

impl StageValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the value as `T`, or `None` if it holds another type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl std::fmt::Debug for StageValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StageValue(..)")
    }
}

/// Stage results keyed by module name
#[derive(Debug, Clone, Default)]
pub struct StageResults {
    values: HashMap<String, StageValue>,
}

impl StageResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result published by `module`, downcast to `T`
    pub fn get<T: Any>(&self, module: &str) -> Option<&T> {
        self.values.get(module).and_then(|v| v.downcast_ref::<T>())
    }

    /// Raw result published by `module`
    pub fn value(&self, module: &str) -> Option<&StageValue> {
        self.values.get(module)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.values.contains_key(module)
    }

    /// Names of the modules that published a result
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn insert(&mut self, module: &str, value: StageValue) {
        self.values.insert(module.to_string(), value);
    }
}

/// Frame-wide data shared by every stage of one tick
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Monotonic frame counter, starting at 0 for the session
    pub frame_index: u64,
    /// Frame timestamp in milliseconds (never decreases)
    pub timestamp_ms: f64,
    /// Display geometry in effect for this frame
    pub geometry: CameraGeometry,
    /// Tracking snapshot for this frame, with extras filtered by the tracking
    /// config
    pub reality: Option<Arc<TrackingResult>>,
}

/// Input of `onProcessGpu`
pub struct GpuStage<'a> {
    pub frame: &'a FrameInfo,
}

/// Input of `onProcessCpu`
pub struct CpuStage<'a> {
    pub frame: &'a FrameInfo,
    /// GPU results of every module this frame
    pub process_gpu: &'a StageResults,
    /// This module's own GPU result, if it published one
    pub own_gpu: Option<&'a StageValue>,
}

/// Input of `onUpdate`
pub struct UpdateStage<'a> {
    pub frame: &'a FrameInfo,
    pub process_gpu: &'a StageResults,
    pub process_cpu: &'a StageResults,
    /// Hit tests and geometry against the last committed snapshot
    pub tracking: &'a TrackingQuery,
}

/// Input of `onRender`
pub struct RenderStage<'a> {
    pub frame: &'a FrameInfo,
    pub process_gpu: &'a StageResults,
    pub process_cpu: &'a StageResults,
}
