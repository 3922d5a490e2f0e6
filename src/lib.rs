// SPDX-License-Identifier: MPL-2.0

//! Camera Pipeline - frame-synchronous orchestration for camera AR modules
//!
//! A session hosts independently developed modules (tracking, rendering,
//! effects, UI overlays) around one camera feed. Modules register optional
//! callbacks; the session drives them through a fixed lifecycle and a fixed
//! per-frame stage order, threading each stage's results into the next.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`pipeline`]: Module registry, lifecycle dispatch, frame scheduling and
//!   the session state machine
//! - [`backends`]: Capture device and tracking engine abstractions, plus
//!   virtual implementations
//! - [`config`]: Session configuration and run options
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::with_default_backends(&Config::default());
//! session.add_module(PipelineModule::new("overlay").on_render(|_| Ok(())))?;
//! session.run(RunOptions::new(SurfaceId("canvas".into()))).await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Config, RunOptions};
pub use errors::{CallbackResult, ModuleFault, SessionError, SessionResult, StageError};
pub use pipeline::{PipelineModule, Session, SessionHandle, SessionState, StageValue};

/// Engine version, derived from `git describe` at build time
pub fn version() -> &'static str {
    env!("GIT_VERSION")
}
