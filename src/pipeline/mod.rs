// SPDX-License-Identifier: MPL-2.0

//! Camera pipeline orchestration
//!
//! This module coordinates independently developed modules around a single
//! camera session:
//!
//! - [`PipelineModule`]: a named set of optional lifecycle and stage callbacks
//! - [`ModuleRegistry`]: insertion-ordered, uniquely named modules
//! - [`LifecycleDispatcher`]: invokes lifecycle callbacks and routes faults
//!   to `onException`
//! - [`FrameScheduler`]: runs `onProcessGpu` → `onProcessCpu` → `onUpdate`
//!   → `onRender` once per frame
//! - [`TrackingQuery`]: hit tests and camera geometry against the committed
//!   tracking snapshot
//! - [`Session`] / [`SessionHandle`]: the state machine and its thread-safe
//!   control handle
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::with_default_backends(&Config::default());
//! session.add_module(PipelineModule::new("logger").on_update(|frame| {
//!     debug!(frame = frame.frame.frame_index, "update");
//!     Ok(())
//! }))?;
//! session.run(RunOptions::new(SurfaceId("canvas".into()))).await?;
//! session.tick(0.0);
//! session.post_render_tick();
//! ```

pub mod dispatcher;
pub mod frame;
pub mod handle;
pub mod info;
pub mod module;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod tracking_query;

pub use dispatcher::{LifecycleDispatcher, LifecycleEvent};
pub use frame::{
    CpuStage, FrameInfo, GpuStage, RenderStage, StageResults, StageValue, UpdateStage,
};
pub use handle::SessionHandle;
pub use info::SessionInfo;
pub use module::{BeforeRunFuture, CallbackKind, ModuleHandle, ModuleRef, PipelineModule};
pub use registry::{Attachment, BatchAddReport, ModuleRegistry};
pub use scheduler::{FrameScheduler, TickReport};
pub use session::{Session, spawn_run_loop};
pub use state::SessionState;
pub use tracking_query::TrackingQuery;
