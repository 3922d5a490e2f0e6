// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for the pipeline's external collaborators
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Pipeline Session              │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │   Camera    │    │    Tracking      │   │
//! │  │  (capture)  │    │  (6-DoF / SLAM)  │   │
//! │  └─────────────┘    └──────────────────┘   │
//! │  ┌─────────────┐                           │
//! │  │   Virtual   │                           │
//! │  │   camera    │                           │
//! │  └─────────────┘                           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Capture device trait, device events and the frame loop
//! - [`tracking`]: Tracking engine trait, pose and hit-test types
//! - [`virtual_camera`]: Scriptable capture device without hardware

pub mod camera;
pub mod tracking;
pub mod virtual_camera;
