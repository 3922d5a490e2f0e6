// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running a simulated session against the virtual backends
//! - Reporting environment compatibility

use camera_pipeline::backends::camera::{CameraStatus, SurfaceId};
use camera_pipeline::backends::tracking::{
    Estimated3DPosition, HitTestType, Quat, SyntheticTracker, TrackingOptions, Vec3,
};
use camera_pipeline::backends::virtual_camera::VirtualCaptureDevice;
use camera_pipeline::constants;
use camera_pipeline::pipeline::{SessionHandle, spawn_run_loop};
use camera_pipeline::{Config, PipelineModule, RunOptions, Session, SessionState, StageValue};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

/// Counters collected by the demo modules
#[derive(Debug, Default)]
struct SimulationStats {
    frames: u64,
    rendered: u64,
    frames_with_hits: u64,
    nearest_hit: Option<Estimated3DPosition>,
    world_points: usize,
    faults: u64,
    camera_statuses: Vec<String>,
}

type SharedStats = Arc<Mutex<SimulationStats>>;

fn with_stats<R>(stats: &SharedStats, f: impl FnOnce(&mut SimulationStats) -> R) -> R {
    let mut guard = stats.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Run a session on the virtual camera for `frames` frames
pub fn simulate(
    frames: u64,
    fps: Option<u32>,
    config_path: Option<PathBuf>,
    own_loop: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if let Some(fps) = fps {
        config.target_fps = fps;
    }

    let tracker = SyntheticTracker::new()
        .with_warmup(2)
        .with_estimate(Estimated3DPosition {
            kind: HitTestType::FeaturePoint,
            position: Vec3::new(0.0, 0.0, -1.0),
            rotation: Quat::IDENTITY,
            distance: 0.0,
        })
        .with_estimate(Estimated3DPosition {
            kind: HitTestType::DetectedSurface,
            position: Vec3::new(0.0, -1.2, -2.0),
            rotation: Quat::IDENTITY,
            distance: 0.0,
        });
    let mut session = Session::new(&config, Box::new(VirtualCaptureDevice::new()), Box::new(tracker));
    session.configure_tracking(TrackingOptions {
        enable_world_points: Some(true),
        ..Default::default()
    });

    let handle = session.handle();
    let stats = SharedStats::default();
    let report = session.add_modules(demo_modules(frames, handle.clone(), &stats));
    debug!(added = report.added.len(), "Demo modules installed");

    // Set up Ctrl+C handler
    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        ctrlc_handle.stop();
    })?;

    println!("Camera pipeline {}", camera_pipeline::version());
    println!(
        "Simulating {} frames at {} fps ({} run loop)",
        frames,
        config.target_fps,
        if own_loop { "own" } else { "external" }
    );
    println!("Modules: {}", session.module_names().join(", "));
    println!();

    let options = RunOptions::from_config(&config, SurfaceId("simulate".to_string()))
        .with_own_run_loop(own_loop);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(session.run(options))?;
    info!("Simulation started");

    let start = Instant::now();
    if own_loop {
        let session = Arc::new(Mutex::new(session));
        let mut controller = spawn_run_loop(Arc::clone(&session));
        controller.join();
        let session = Arc::try_unwrap(session)
            .map_err(|_| "session still shared after run loop exit")?
            .into_inner()
            .map_err(|_| "session mutex poisoned")?;
        session.shutdown();
    } else {
        let interval = constants::frame_interval(config.target_fps);
        while session.state() != SessionState::Stopped {
            let timestamp_ms = start.elapsed().as_secs_f64() * 1000.0;
            session.tick(timestamp_ms);
            session.post_render_tick();
            std::thread::sleep(interval);
        }
        session.shutdown();
    }
    let elapsed = start.elapsed();

    with_stats(&stats, |s| {
        println!("Frames:        {}", s.frames);
        println!("Rendered:      {}", s.rendered);
        println!("Frames w/ hit: {}", s.frames_with_hits);
        println!("World points:  {}", s.world_points);
        println!("Faults:        {}", s.faults);
        println!("Camera status: {}", s.camera_statuses.join(" -> "));
        if let Some(hit) = &s.nearest_hit {
            println!(
                "Center hit:    {} at ({:.3}, {:.3}, {:.3}), {:.3} away",
                hit.kind, hit.position.x, hit.position.y, hit.position.z, hit.distance
            );
        }
        println!("Elapsed:       {:.2}s", elapsed.as_secs_f64());
    });

    Ok(())
}

/// Modules installed by `simulate`
fn demo_modules(frame_limit: u64, handle: SessionHandle, stats: &SharedStats) -> Vec<PipelineModule> {
    let clock = PipelineModule::new("frame-clock")
        .on_process_gpu(|stage| Ok(Some(StageValue::new(stage.frame.frame_index))));

    let readback_stats = Arc::clone(stats);
    let readback = PipelineModule::new("point-readback").on_process_cpu(move |stage| {
        let count = stage
            .frame
            .reality
            .as_ref()
            .and_then(|r| r.world_points.as_ref())
            .map(|points| points.len())
            .unwrap_or(0);
        with_stats(&readback_stats, |s| s.world_points = count);
        Ok(Some(StageValue::new(count)))
    });

    let update_stats = Arc::clone(stats);
    let render_stats = Arc::clone(stats);
    let reticle = PipelineModule::new("reticle")
        .on_update(move |stage| {
            let hits = stage.tracking.hit_test(0.5, 0.5, &[]);
            with_stats(&update_stats, |s| {
                if let Some(nearest) = hits.into_iter().next() {
                    s.frames_with_hits += 1;
                    s.nearest_hit = Some(nearest);
                }
            });
            Ok(())
        })
        .on_render(move |_| {
            with_stats(&render_stats, |s| s.rendered += 1);
            Ok(())
        });

    let status_stats = Arc::clone(stats);
    let fault_stats = Arc::clone(stats);
    let status = PipelineModule::new("status")
        .on_attach(|info| {
            info!(video = %info.video_size, version = %info.version, "Status module attached");
            Ok(())
        })
        .on_camera_status_change(move |status| {
            let label = match status {
                CameraStatus::Requesting => "requesting".to_string(),
                CameraStatus::HasStream => "hasStream".to_string(),
                CameraStatus::HasVideo => "hasVideo".to_string(),
                CameraStatus::Failed(reason) => format!("failed ({})", reason),
            };
            with_stats(&status_stats, |s| s.camera_statuses.push(label));
            Ok(())
        })
        .on_exception(move |error| {
            eprintln!("Module fault: {}", error);
            with_stats(&fault_stats, |s| s.faults += 1);
            Ok(())
        });

    let limiter_stats = Arc::clone(stats);
    let limiter = PipelineModule::new("frame-limit").on_update(move |_| {
        let frames = with_stats(&limiter_stats, |s| {
            s.frames += 1;
            s.frames
        });
        if frames >= frame_limit {
            info!(frames, "Frame limit reached");
            handle.stop();
        }
        Ok(())
    });

    vec![clock, readback, reticle, status, limiter]
}

/// Print the compatibility report of the default capture device
pub fn show_info() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::with_default_backends(&Config::load_or_default());
    let compatibility = session.compatibility();
    let estimate = session.device_estimate();

    println!("Version:    {}", camera_pipeline::version());
    if compatibility.is_compatible() {
        println!("Compatible: yes");
    } else {
        let reasons: Vec<String> = compatibility.reasons.iter().map(|r| r.to_string()).collect();
        println!("Compatible: no ({})", reasons.join(", "));
    }
    println!(
        "Device:     {} {} ({} {}, {})",
        estimate.manufacturer, estimate.model, estimate.os, estimate.os_version, estimate.locale
    );
    match Config::default_path() {
        Some(path) => println!("Config:     {}", path.display()),
        None => println!("Config:     <no config directory>"),
    }
    Ok(())
}
