// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame stage execution
//!
//! A tick runs `onProcessGpu`, `onProcessCpu` and `onUpdate` in that order,
//! each across the attached modules in registry order. `onRender` runs from
//! [`FrameScheduler::run_post_render`] once the host has drawn the camera
//! feed. Between stages the scheduler checks the control queue: a pending
//! stop ends the tick early and pending removals take the module out of the
//! remaining stages.

use super::dispatcher::{LifecycleDispatcher, invoke};
use super::frame::{CpuStage, FrameInfo, GpuStage, RenderStage, StageResults, StageValue, UpdateStage};
use super::module::CallbackKind;
use super::registry::{ModuleRegistry, RegisteredModule};
use super::state::Shared;
use super::tracking_query::TrackingQuery;
use crate::errors::StageError;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Working state of the frame in flight
pub(crate) struct FrameContext {
    pub frame: FrameInfo,
    pub process_gpu: StageResults,
    pub process_cpu: StageResults,
    /// Registration ids left out of the remaining stages
    pub skipped: HashSet<u64>,
    /// A stop arrived mid-tick; no further stages run for this frame
    pub interrupted: bool,
}

/// What happened during one call to `tick`
#[derive(Debug, Clone)]
pub struct TickReport {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub process_gpu: StageResults,
    pub process_cpu: StageResults,
    /// Callback failures, in the order they happened
    pub faults: Vec<StageError>,
    /// The tick ended early because the session is stopping
    pub interrupted: bool,
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    frames: u64,
    last_timestamp_ms: Option<f64>,
    current: Option<FrameContext>,
}

impl std::fmt::Debug for FrameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("frame_index", &self.frame.frame_index)
            .field("interrupted", &self.interrupted)
            .finish()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames started so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Whether a frame is waiting for `run_post_render`
    pub fn has_pending_frame(&self) -> bool {
        self.current.is_some()
    }

    /// Clamp `timestamp_ms` so frame timestamps never go backwards
    fn next_timestamp(&mut self, timestamp_ms: f64) -> f64 {
        let last = self.last_timestamp_ms.unwrap_or(0.0);
        let ts = if timestamp_ms.is_nan() || timestamp_ms < last {
            trace!(timestamp_ms, last, "Clamping non-monotonic timestamp");
            last
        } else {
            timestamp_ms
        };
        self.last_timestamp_ms = Some(ts);
        ts
    }

    /// Run the GPU, CPU and update stages for one frame
    pub(crate) fn run_pre_render(
        &mut self,
        registry: &mut ModuleRegistry,
        dispatcher: &mut LifecycleDispatcher,
        tracking: &mut TrackingQuery,
        shared: &Shared,
        timestamp_ms: f64,
    ) -> TickReport {
        if self.current.take().is_some() {
            debug!("Previous frame never closed; discarding it");
        }

        let timestamp_ms = self.next_timestamp(timestamp_ms);
        let frame_index = self.frames;
        self.frames += 1;

        let (geometry, reality) = tracking.begin_frame(frame_index, timestamp_ms);
        let mut ctx = FrameContext {
            frame: FrameInfo {
                frame_index,
                timestamp_ms,
                geometry,
                reality,
            },
            process_gpu: StageResults::new(),
            process_cpu: StageResults::new(),
            skipped: HashSet::new(),
            interrupted: false,
        };
        let mut faults = Vec::new();
        trace!(frame = frame_index, timestamp_ms, "Frame start");

        if !halted(&mut ctx, registry, shared) {
            run_stage(CallbackKind::ProcessGpu, registry, dispatcher, &mut ctx, &mut faults, |entry, ctx| {
                let name = entry.name().to_string();
                let cb = entry.module.callbacks.process_gpu.as_mut()?;
                let stage = GpuStage { frame: &ctx.frame };
                Some(invoke(&name, CallbackKind::ProcessGpu, || cb(&stage)))
            });
        }

        if !halted(&mut ctx, registry, shared) {
            run_stage(CallbackKind::ProcessCpu, registry, dispatcher, &mut ctx, &mut faults, |entry, ctx| {
                let name = entry.name().to_string();
                let cb = entry.module.callbacks.process_cpu.as_mut()?;
                let stage = CpuStage {
                    frame: &ctx.frame,
                    process_gpu: &ctx.process_gpu,
                    own_gpu: ctx.process_gpu.value(&name),
                };
                Some(invoke(&name, CallbackKind::ProcessCpu, || cb(&stage)))
            });
        }

        if !halted(&mut ctx, registry, shared) {
            let query: &TrackingQuery = tracking;
            run_stage(CallbackKind::Update, registry, dispatcher, &mut ctx, &mut faults, |entry, ctx| {
                let name = entry.name().to_string();
                let cb = entry.module.callbacks.update.as_mut()?;
                let stage = UpdateStage {
                    frame: &ctx.frame,
                    process_gpu: &ctx.process_gpu,
                    process_cpu: &ctx.process_cpu,
                    tracking: query,
                };
                Some(invoke(&name, CallbackKind::Update, || cb(&stage)).map(|()| None))
            });
        }

        if ctx.interrupted {
            tracking.discard_staged();
        } else {
            tracking.commit();
        }

        let report = TickReport {
            frame_index,
            timestamp_ms,
            process_gpu: ctx.process_gpu.clone(),
            process_cpu: ctx.process_cpu.clone(),
            faults,
            interrupted: ctx.interrupted,
        };
        self.current = Some(ctx);
        report
    }

    /// Close the frame, running `onRender` first if the session owns its
    /// run loop
    pub(crate) fn run_post_render(
        &mut self,
        registry: &mut ModuleRegistry,
        dispatcher: &mut LifecycleDispatcher,
        shared: &Shared,
        owns_run_loop: bool,
    ) -> Vec<StageError> {
        let Some(mut ctx) = self.current.take() else {
            trace!("No frame to close");
            return Vec::new();
        };
        let mut faults = Vec::new();

        if owns_run_loop && !halted(&mut ctx, registry, shared) {
            run_stage(CallbackKind::Render, registry, dispatcher, &mut ctx, &mut faults, |entry, ctx| {
                let name = entry.name().to_string();
                let cb = entry.module.callbacks.render.as_mut()?;
                let stage = RenderStage {
                    frame: &ctx.frame,
                    process_gpu: &ctx.process_gpu,
                    process_cpu: &ctx.process_cpu,
                };
                Some(invoke(&name, CallbackKind::Render, || cb(&stage)).map(|()| None))
            });
        }

        trace!(frame = ctx.frame.frame_index, "Frame closed");
        faults
    }

    /// Drop the frame in flight without running any more stages
    pub(crate) fn discard(&mut self) {
        if let Some(ctx) = self.current.take() {
            debug!(frame = ctx.frame.frame_index, "Discarding frame context");
        }
    }
}

/// Check the control queue before starting a stage
///
/// Returns `true` if the frame must not run any more stages.
fn halted(ctx: &mut FrameContext, registry: &ModuleRegistry, shared: &Shared) -> bool {
    if ctx.interrupted {
        return true;
    }
    if shared.stop_requested() {
        debug!(frame = ctx.frame.frame_index, "Stop pending; skipping remaining stages");
        ctx.interrupted = true;
        return true;
    }

    if shared.clear_pending() {
        for index in 0..registry.len() {
            ctx.skipped.insert(registry.entry(index).id);
        }
    } else {
        for target in shared.pending_removals() {
            if let Some(index) = registry.find(&target) {
                ctx.skipped.insert(registry.entry(index).id);
            }
        }
    }
    false
}

/// Invoke one stage across the attached modules in registry order
///
/// `call` returns `None` when the module has no callback for the stage. A
/// failing module is reported and skipped for the rest of the frame.
fn run_stage<F>(
    kind: CallbackKind,
    registry: &mut ModuleRegistry,
    dispatcher: &mut LifecycleDispatcher,
    ctx: &mut FrameContext,
    faults: &mut Vec<StageError>,
    mut call: F,
) where
    F: FnMut(&mut RegisteredModule, &FrameContext) -> Option<Result<Option<StageValue>, StageError>>,
{
    for index in 0..registry.len() {
        let entry = registry.entry_mut(index);
        if !entry.is_attached() || ctx.skipped.contains(&entry.id) {
            continue;
        }
        let id = entry.id;
        let name = entry.name().to_string();

        let Some(result) = call(entry, &*ctx) else {
            continue;
        };
        match result {
            Ok(Some(value)) => match kind {
                CallbackKind::ProcessGpu => ctx.process_gpu.insert(&name, value),
                CallbackKind::ProcessCpu => ctx.process_cpu.insert(&name, value),
                _ => {}
            },
            Ok(None) => {}
            Err(e) => {
                ctx.skipped.insert(id);
                dispatcher.report_exception(registry, &e);
                faults.push(e);
            }
        }
    }
}
