// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the session lifecycle and frame scheduling

use camera_pipeline::backends::camera::{
    CameraStatus, DeviceEvent, Dimensions, IncompatibilityReason, SurfaceId,
};
use camera_pipeline::backends::tracking::{
    CameraProjectionUpdate, HitTestType, SyntheticTracker, TrackerStats, TrackingOptions, Vec3,
};
use camera_pipeline::backends::virtual_camera::{CaptureStats, VirtualCaptureDevice};
use camera_pipeline::errors::{CaptureError, ModuleFault};
use camera_pipeline::pipeline::{Attachment, CallbackKind, spawn_run_loop};
use camera_pipeline::{
    Config, PipelineModule, RunOptions, Session, SessionError, SessionState, StageValue,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Callback that appends `entry` to `log`
fn recorder(log: &Log, entry: String) -> impl Fn() + Send + 'static {
    let log = Arc::clone(log);
    move || log.lock().unwrap().push(entry.clone())
}

/// Module recording every lifecycle and stage callback as "name:callback"
fn observer(name: &str, log: &Log) -> PipelineModule {
    let attach = recorder(log, format!("{}:onAttach", name));
    let detach = recorder(log, format!("{}:onDetach", name));
    let before_run = recorder(log, format!("{}:onBeforeRun", name));
    let start = recorder(log, format!("{}:onStart", name));
    let paused = recorder(log, format!("{}:onPaused", name));
    let resume = recorder(log, format!("{}:onResume", name));
    let gpu = recorder(log, format!("{}:onProcessGpu", name));
    let cpu = recorder(log, format!("{}:onProcessCpu", name));
    let update = recorder(log, format!("{}:onUpdate", name));
    let render = recorder(log, format!("{}:onRender", name));

    PipelineModule::new(name)
        .on_attach(move |_| {
            attach();
            Ok(())
        })
        .on_detach(move |_| {
            detach();
            Ok(())
        })
        .on_before_run(move |_| {
            before_run();
            async { Ok::<(), ModuleFault>(()) }
        })
        .on_start(move |_| {
            start();
            Ok(())
        })
        .on_paused(move |_| {
            paused();
            Ok(())
        })
        .on_resume(move |_| {
            resume();
            Ok(())
        })
        .on_process_gpu(move |_| {
            gpu();
            Ok(None)
        })
        .on_process_cpu(move |_| {
            cpu();
            Ok(None)
        })
        .on_update(move |_| {
            update();
            Ok(())
        })
        .on_render(move |_| {
            render();
            Ok(())
        })
}

/// Entries of `log` belonging to module `name`, without the prefix
fn history(log: &Log, name: &str) -> Vec<String> {
    let prefix = format!("{}:", name);
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
        .collect()
}

fn is_stage(entry: &str) -> bool {
    matches!(
        entry,
        "onProcessGpu" | "onProcessCpu" | "onUpdate" | "onRender"
    )
}

/// Sets the flag when dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Fixture {
    session: Session,
    capture: Arc<Mutex<CaptureStats>>,
    tracker: Arc<Mutex<TrackerStats>>,
}

fn fixture_with(config: Config, device: VirtualCaptureDevice, tracker: SyntheticTracker) -> Fixture {
    let capture = device.stats();
    let tracker_stats = tracker.stats();
    Fixture {
        session: Session::new(&config, Box::new(device), Box::new(tracker)),
        capture,
        tracker: tracker_stats,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        Config::default(),
        VirtualCaptureDevice::new(),
        SyntheticTracker::new(),
    )
}

fn options() -> RunOptions {
    RunOptions::new(SurfaceId("canvas".to_string()))
}

#[test]
fn test_registry_order_is_fifo_stable() {
    let mut f = fixture();
    for name in ["a", "b", "c"] {
        f.session.add_module(PipelineModule::new(name)).unwrap();
    }
    assert!(f.session.remove_module("b"));
    f.session.add_module(PipelineModule::new("d")).unwrap();
    f.session.add_module(PipelineModule::new("b")).unwrap();
    assert!(!f.session.remove_module("missing"));

    assert_eq!(f.session.module_names(), vec!["a", "c", "d", "b"]);
}

#[tokio::test]
async fn test_duplicate_add_leaves_existing_module_untouched() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(PipelineModule::new("first")).unwrap();
    f.session.add_module(observer("dup", &log)).unwrap();
    f.session.run(options()).await.unwrap();

    let err = f.session.add_module(observer("dup", &log)).unwrap_err();

    assert_eq!(err.name, "dup");
    assert_eq!(f.session.module_names(), vec!["first", "dup"]);
    assert_eq!(f.session.attachment("dup"), Some(Attachment::Attached));
    // Only the original registration was ever attached
    assert_eq!(
        history(&log, "dup")
            .iter()
            .filter(|e| *e == "onAttach")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_batch_add_reports_rejections() {
    let mut f = fixture();
    let report = f.session.add_modules(vec![
        PipelineModule::new("a"),
        PipelineModule::new("a"),
        PipelineModule::new("b"),
    ]);

    assert!(!report.is_complete());
    assert_eq!(report.added.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].name, "a");
    assert_eq!(f.session.module_names(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_run_lifecycle_order() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();

    f.session.run(options()).await.unwrap();

    assert_eq!(f.session.state(), SessionState::Running);
    assert_eq!(
        history(&log, "m"),
        vec!["onBeforeRun", "onStart", "onAttach"]
    );
    let capture = f.capture.lock().unwrap();
    assert_eq!(capture.opens, 1);
    assert!(capture.is_open);
    assert_eq!(
        capture.last_request.as_ref().unwrap().surface,
        SurfaceId("canvas".to_string())
    );
}

#[tokio::test]
async fn test_module_added_while_running_attaches_before_first_stage() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("a", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    f.session.post_render_tick();

    f.session.add_module(observer("b", &log)).unwrap();
    assert_eq!(history(&log, "b"), vec!["onAttach"]);

    f.session.tick(16.0);

    assert_eq!(
        history(&log, "b"),
        vec!["onAttach", "onProcessGpu", "onProcessCpu", "onUpdate"]
    );
}

#[tokio::test]
async fn test_module_queued_by_handle_joins_at_next_tick() {
    let log = new_log();
    let mut f = fixture();
    f.session.run(options()).await.unwrap();
    let handle = f.session.handle();

    handle.add_module(observer("late", &log));
    assert!(history(&log, "late").is_empty());
    assert!(f.session.module_names().is_empty());

    f.session.tick(0.0);

    let late = history(&log, "late");
    assert_eq!(late[0], "onAttach");
    assert!(late[1..].iter().all(|e| is_stage(e)));
    assert_eq!(late.len(), 4);
}

#[tokio::test]
async fn test_pause_then_resume_without_tick() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    f.session.post_render_tick();
    let before = history(&log, "m").len();

    assert!(f.session.pause());
    assert!(f.session.is_paused());
    assert!(f.session.resume());
    assert!(!f.session.is_paused());

    assert_eq!(&history(&log, "m")[before..], ["onPaused", "onResume"]);
    let capture = f.capture.lock().unwrap();
    assert_eq!((capture.suspends, capture.resumes), (1, 1));
}

#[tokio::test]
async fn test_paused_session_runs_no_stages() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.pause();

    assert!(f.session.tick(0.0).is_none());
    assert!(f.session.post_render_tick().is_empty());
    assert!(!history(&log, "m").iter().any(|e| is_stage(e)));
    assert!(f.tracker.lock().unwrap().suspended);

    // Pause is not valid from Paused, resume is not valid from Running
    assert!(!f.session.pause());
    assert!(f.session.resume());
    assert!(!f.session.resume());
}

#[tokio::test]
async fn test_pause_between_tick_and_render_drops_the_frame() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session
        .run(options().with_own_run_loop(true))
        .await
        .unwrap();

    f.session.tick(0.0).unwrap();
    assert!(f.session.pause());
    assert!(f.session.post_render_tick().is_empty());
    assert!(!history(&log, "m").contains(&"onRender".to_string()));

    assert!(f.session.resume());
    f.session.tick(16.0).unwrap();
    f.session.post_render_tick();
    let renders = history(&log, "m")
        .iter()
        .filter(|e| *e == "onRender")
        .count();
    assert_eq!(renders, 1);
}

#[tokio::test]
async fn test_pause_queued_while_starting_applies_once_running() {
    let log = new_log();
    let mut f = fixture();
    let handle = f.session.handle();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session
        .add_module(PipelineModule::new("pauser").on_before_run(move |_| {
            handle.pause();
            async { Ok::<(), ModuleFault>(()) }
        }))
        .unwrap();

    f.session.run(options()).await.unwrap();

    assert!(f.session.is_paused());
    assert_eq!(
        history(&log, "m"),
        vec!["onBeforeRun", "onStart", "onAttach", "onPaused"]
    );
}

#[tokio::test]
async fn test_cpu_fault_is_isolated_to_the_module() {
    let log = new_log();
    let exceptions = Arc::new(Mutex::new(Vec::new()));
    let cpu_calls = Arc::new(Mutex::new(0u32));

    let calls = Arc::clone(&cpu_calls);
    let updates = recorder(&log, "faulty:onUpdate".to_string());
    let faulty = PipelineModule::new("faulty")
        .on_process_cpu(move |_| {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                return Err("readback failed".into());
            }
            Ok(None)
        })
        .on_update(move |_| {
            updates();
            Ok(())
        });

    let seen = Arc::clone(&exceptions);
    let watcher = observer("watcher", &log).on_exception(move |e| {
        seen.lock().unwrap().push((e.module.clone(), e.callback));
        Ok(())
    });

    let mut f = fixture();
    f.session.add_modules(vec![faulty, watcher]);
    f.session.run(options()).await.unwrap();

    let report = f.session.tick(0.0).unwrap();
    assert_eq!(report.faults.len(), 1);
    assert!(history(&log, "watcher").contains(&"onUpdate".to_string()));
    assert!(history(&log, "faulty").is_empty());
    assert_eq!(
        *exceptions.lock().unwrap(),
        vec![("faulty".to_string(), CallbackKind::ProcessCpu)]
    );
    f.session.post_render_tick();

    let report = f.session.tick(16.0).unwrap();
    assert!(report.faults.is_empty());
    assert_eq!(*cpu_calls.lock().unwrap(), 2);
    assert_eq!(history(&log, "faulty"), vec!["onUpdate"]);
    assert_eq!(f.session.state(), SessionState::Running);
}

#[tokio::test]
async fn test_panicking_stage_is_a_fault() {
    let mut f = fixture();
    f.session
        .add_module(PipelineModule::new("boom").on_update(|_| panic!("index out of range")))
        .unwrap();
    f.session.run(options()).await.unwrap();

    let report = f.session.tick(0.0).unwrap();

    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].callback, CallbackKind::Update);
    assert!(report.faults[0].message.contains("index out of range"));
    assert_eq!(f.session.faults_reported(), 1);
}

#[tokio::test]
async fn test_start_and_attach_faults_reach_modules_attached_in_the_same_pass() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let bad = PipelineModule::new("bad").on_start(|_| Err("boom".into()));
    let flaky = PipelineModule::new("flaky").on_attach(|_| Err("no gpu".into()));
    let watcher = PipelineModule::new("watcher").on_exception(move |e| {
        s.lock().unwrap().push((e.module.clone(), e.callback));
        Ok(())
    });

    let mut f = fixture();
    f.session.add_modules(vec![bad, flaky, watcher]);
    f.session.run(options()).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("bad".to_string(), CallbackKind::Start),
            ("flaky".to_string(), CallbackKind::Attach),
        ]
    );
    assert_eq!(f.session.faults_reported(), 2);
    assert_eq!(f.session.attachment("flaky"), Some(Attachment::Detached));
    assert_eq!(f.session.state(), SessionState::Running);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let log = new_log();
    let mut f = fixture();
    assert!(!f.session.stop());

    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();

    assert!(f.session.stop());
    assert!(!f.session.stop());

    let detaches = history(&log, "m")
        .iter()
        .filter(|e| *e == "onDetach")
        .count();
    assert_eq!(detaches, 1);
    assert_eq!(f.capture.lock().unwrap().closes, 1);
}

#[tokio::test]
async fn test_stop_keeps_registry_and_run_reattaches() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    f.session.stop();

    assert_eq!(f.session.module_names(), vec!["m"]);
    assert_eq!(f.session.attachment("m"), Some(Attachment::Detached));
    assert!(f.session.tracking().latest().is_none());

    f.session.run(options()).await.unwrap();
    assert_eq!(f.session.attachment("m"), Some(Attachment::Attached));
    assert_eq!(
        history(&log, "m")
            .iter()
            .filter(|e| *e == "onAttach")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_gpu_result_flows_into_cpu_stage() {
    #[derive(Debug)]
    struct Payload {
        v: i32,
    }

    let a = PipelineModule::new("A").on_process_gpu(|_| Ok(Some(StageValue::new(Payload { v: 1 }))));
    let b = PipelineModule::new("B").on_process_cpu(|stage| {
        let v = stage
            .process_gpu
            .get::<Payload>("A")
            .map(|p| p.v)
            .ok_or("missing A result")?;
        Ok(Some(StageValue::new(v + 1)))
    });

    let mut f = fixture();
    f.session.add_modules(vec![a, b]);
    f.session.run(options()).await.unwrap();

    let report = f.session.tick(0.0).unwrap();

    assert_eq!(report.process_cpu.get::<i32>("B"), Some(&2));
    assert!(report.faults.is_empty());
}

#[tokio::test]
async fn test_rejected_before_run_aborts_start() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("ok", &log)).unwrap();
    f.session
        .add_module(
            PipelineModule::new("loader")
                .on_before_run(|_| async { Err::<(), ModuleFault>("model download failed".into()) }),
        )
        .unwrap();

    let err = f.session.run(options()).await.unwrap_err();

    match err {
        SessionError::ModuleInit(e) => {
            assert_eq!(e.module, "loader");
            assert_eq!(e.reason, "model download failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(f.session.state(), SessionState::Stopped);
    assert!(!f.session.is_paused());
    assert!(!history(&log, "ok").contains(&"onStart".to_string()));
    assert_eq!(f.capture.lock().unwrap().opens, 0);
}

#[tokio::test]
async fn test_before_run_timeout() {
    let config = Config::from_json_str(r#"{ "before_run_timeout_ms": 20 }"#).unwrap();
    let mut f = fixture_with(config, VirtualCaptureDevice::new(), SyntheticTracker::new());
    f.session
        .add_module(PipelineModule::new("stuck").on_before_run(|_| {
            futures::future::pending::<Result<(), ModuleFault>>()
        }))
        .unwrap();

    let err = f.session.run(options()).await.unwrap_err();

    assert!(matches!(err, SessionError::ModuleInit(ref e) if e.module == "stuck"));
    assert_eq!(f.session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_incompatible_environment_dispatches_nothing() {
    let log = new_log();
    let mut f = fixture_with(
        Config::default(),
        VirtualCaptureDevice::new().with_incompatibility(vec![IncompatibilityReason::MissingUserMedia]),
        SyntheticTracker::new(),
    );
    f.session.add_module(observer("m", &log)).unwrap();

    let err = f.session.run(options()).await.unwrap_err();

    match err {
        SessionError::IncompatibleEnvironment(e) => {
            assert_eq!(e.reasons, vec![IncompatibilityReason::MissingUserMedia]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(history(&log, "m").is_empty());
    assert_eq!(f.session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_capture_failure_aborts_start() {
    let log = new_log();
    let mut f = fixture_with(
        Config::default(),
        VirtualCaptureDevice::new().with_open_error(CaptureError::PermissionDenied),
        SyntheticTracker::new(),
    );
    f.session.add_module(observer("m", &log)).unwrap();

    let err = f.session.run(options()).await.unwrap_err();

    assert_eq!(err, SessionError::Capture(CaptureError::PermissionDenied));
    assert_eq!(f.session.state(), SessionState::Stopped);
    assert_eq!(f.session.attachment("m"), Some(Attachment::Detached));
    assert!(!history(&log, "m").contains(&"onStart".to_string()));
    assert!(matches!(
        f.session.info().camera_status,
        Some(CameraStatus::Failed(_))
    ));
}

#[tokio::test]
async fn test_stop_during_before_run_cancels_start() {
    let mut f = fixture();
    let handle = f.session.handle();
    f.session
        .add_module(PipelineModule::new("impatient").on_before_run(move |_| {
            handle.stop();
            async { Ok::<(), ModuleFault>(()) }
        }))
        .unwrap();

    let err = f.session.run(options()).await.unwrap_err();

    assert_eq!(err, SessionError::Cancelled);
    assert_eq!(f.session.state(), SessionState::Stopped);
    assert_eq!(f.capture.lock().unwrap().opens, 0);
    assert!(!f.session.handle().stop_pending());
}

#[tokio::test]
async fn test_stop_from_another_thread_cancels_pending_before_run() {
    let log = new_log();
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&dropped);
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session
        .add_module(PipelineModule::new("stuck").on_before_run(move |_| {
            let guard = DropFlag(Arc::clone(&flag));
            async move {
                let _guard = guard;
                futures::future::pending::<()>().await;
                Ok::<(), ModuleFault>(())
            }
        }))
        .unwrap();

    let handle = f.session.handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.state(), SessionState::Starting);
        handle.stop();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), f.session.run(options()))
        .await
        .expect("run kept waiting after stop");
    stopper.join().unwrap();

    assert_eq!(result.unwrap_err(), SessionError::Cancelled);
    assert_eq!(f.session.state(), SessionState::Stopped);
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!f.session.handle().stop_pending());
    assert_eq!(f.capture.lock().unwrap().opens, 0);
    assert_eq!(history(&log, "m"), vec!["onBeforeRun"]);
}

#[tokio::test]
async fn test_synchronous_before_run_panic_still_awaits_earlier_futures() {
    let settled = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&settled);
    let slow = PipelineModule::new("slow").on_before_run(move |_| {
        let s = Arc::clone(&s);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            s.store(true, Ordering::SeqCst);
            Ok::<(), ModuleFault>(())
        }
    });
    let broken = PipelineModule::new("broken").on_before_run(|_| {
        if true {
            panic!("bad config");
        }
        async { Ok::<(), ModuleFault>(()) }
    });

    let mut f = fixture();
    f.session.add_modules(vec![slow, broken]);

    let err = f.session.run(options()).await.unwrap_err();

    match err {
        SessionError::ModuleInit(e) => {
            assert_eq!(e.module, "broken");
            assert!(e.reason.contains("bad config"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(settled.load(Ordering::SeqCst));
    assert_eq!(f.session.state(), SessionState::Stopped);
    assert_eq!(f.capture.lock().unwrap().opens, 0);
}

#[tokio::test]
async fn test_run_twice_is_invalid() {
    let mut f = fixture();
    f.session.run(options()).await.unwrap();

    let err = f.session.run(options()).await.unwrap_err();

    assert_eq!(err, SessionError::InvalidState(SessionState::Running));
}

#[tokio::test]
async fn test_stop_requested_mid_tick_skips_later_stages() {
    let log = new_log();
    let mut f = fixture();
    let handle = f.session.handle();
    let stopper = PipelineModule::new("stopper").on_process_gpu(move |_| {
        handle.stop();
        Ok(None)
    });
    f.session.add_module(stopper).unwrap();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();

    let report = f.session.tick(0.0).unwrap();

    assert!(report.interrupted);
    // The GPU stage in progress finishes, nothing after it starts
    let m = history(&log, "m");
    assert!(m.contains(&"onProcessGpu".to_string()));
    assert!(!m.contains(&"onProcessCpu".to_string()));
    assert_eq!(m.last().map(String::as_str), Some("onDetach"));
    assert_eq!(f.session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_handle_requests_apply_at_tick_boundary() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    let handle = f.session.handle();

    handle.pause();
    assert_eq!(handle.state(), SessionState::Running);

    assert!(f.session.tick(0.0).is_none());
    assert!(handle.is_paused());

    handle.resume();
    assert!(f.session.tick(16.0).is_some());
}

#[tokio::test]
async fn test_stop_beats_pause_when_both_queued() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    let handle = f.session.handle();

    handle.pause();
    handle.stop();
    assert!(f.session.tick(0.0).is_none());

    assert_eq!(f.session.state(), SessionState::Stopped);
    assert!(!history(&log, "m").contains(&"onPaused".to_string()));
}

#[tokio::test]
async fn test_removal_by_handle_detaches_once() {
    let log = new_log();
    let mut f = fixture();
    let handle = f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();

    assert!(f.session.remove_by_handle(&handle));
    assert!(!f.session.remove_by_handle(&handle));

    assert_eq!(history(&log, "m").last().map(String::as_str), Some("onDetach"));
    assert!(f.session.module_names().is_empty());
}

#[tokio::test]
async fn test_clear_modules_detaches_in_registry_order() {
    let log = new_log();
    let mut f = fixture();
    f.session
        .add_modules(vec![observer("a", &log), observer("b", &log)]);
    f.session.run(options()).await.unwrap();
    log.lock().unwrap().clear();

    f.session.clear_modules();

    assert_eq!(*log.lock().unwrap(), vec!["a:onDetach", "b:onDetach"]);
    assert!(f.session.module_names().is_empty());
}

#[tokio::test]
async fn test_hit_test_before_any_tracking_result_is_empty() {
    let mut f = fixture_with(
        Config::default(),
        VirtualCaptureDevice::new(),
        SyntheticTracker::new().with_warmup(5),
    );
    assert!(
        f.session
            .hit_test(0.5, 0.5, &[HitTestType::FeaturePoint])
            .is_empty()
    );

    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    assert!(
        f.session
            .hit_test(0.5, 0.5, &[HitTestType::FeaturePoint])
            .is_empty()
    );
}

#[tokio::test]
async fn test_tracking_extras_only_when_enabled() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let probe = PipelineModule::new("probe").on_update(move |stage| {
        let reality = stage.frame.reality.as_ref().ok_or("no snapshot")?;
        s.lock()
            .unwrap()
            .push((reality.lighting.is_some(), reality.world_points.is_some()));
        Ok(())
    });

    let mut f = fixture();
    f.session.add_module(probe).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    f.session.post_render_tick();

    assert!(f.session.configure_tracking(TrackingOptions {
        enable_lighting: Some(true),
        enable_world_points: Some(true),
        ..Default::default()
    }));
    f.session.tick(16.0);

    assert_eq!(*seen.lock().unwrap(), vec![(false, false), (true, true)]);
    assert!(f.session.info().tracking.enable_lighting);
}

#[tokio::test]
async fn test_world_tracking_toggle_only_while_stopped() {
    let mut f = fixture();
    f.session.run(options()).await.unwrap();

    let refused = TrackingOptions {
        disable_world_tracking: Some(true),
        ..Default::default()
    };
    assert!(!f.session.configure_tracking(refused.clone()));
    assert!(!f.session.tracking().config().disable_world_tracking);

    f.session.stop();
    assert!(f.session.configure_tracking(refused));
    assert!(f.tracker.lock().unwrap().config.disable_world_tracking);
}

#[tokio::test]
async fn test_geometry_update_visible_from_next_tick() {
    let origins = Arc::new(Mutex::new(Vec::new()));
    let o = Arc::clone(&origins);
    let probe = PipelineModule::new("probe").on_update(move |stage| {
        o.lock().unwrap().push(stage.frame.geometry.origin);
        Ok(())
    });

    let mut f = fixture();
    f.session.add_module(probe).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    f.session.post_render_tick();

    let origin = Vec3::new(0.0, 1.6, 0.0);
    f.session
        .update_camera_projection_matrix(CameraProjectionUpdate {
            origin: Some(origin),
            ..Default::default()
        });
    assert_eq!(f.session.tracking().geometry().origin, Vec3::ZERO);

    f.session.tick(16.0);

    assert_eq!(*origins.lock().unwrap(), vec![Vec3::ZERO, origin]);
}

#[tokio::test]
async fn test_recenter_queued_through_handle() {
    let mut f = fixture();
    f.session.run(options()).await.unwrap();

    f.session.handle().recenter();
    assert_eq!(f.tracker.lock().unwrap().recenters, 0);

    f.session.tick(0.0);
    assert_eq!(f.tracker.lock().unwrap().recenters, 1);
}

#[tokio::test]
async fn test_device_events_dispatch_only_on_change() {
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&sizes);
    let module = PipelineModule::new("layout").on_canvas_size_change(move |size| {
        s.lock().unwrap().push(size);
        Ok(())
    });

    let mut f = fixture();
    f.session.add_module(module).unwrap();
    f.session.run(options()).await.unwrap();

    let size = Dimensions::new(1080, 1920);
    assert!(f.session.notify(DeviceEvent::CanvasSizeChange(size)));
    assert!(!f.session.notify(DeviceEvent::CanvasSizeChange(size)));

    assert_eq!(*sizes.lock().unwrap(), vec![size]);
    assert_eq!(f.session.info().canvas_size, size);
}

#[tokio::test]
async fn test_camera_status_progression() {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&statuses);
    let module = PipelineModule::new("status").on_camera_status_change(move |status| {
        s.lock().unwrap().push(status.clone());
        Ok(())
    });

    let mut f = fixture();
    f.session.add_module(module).unwrap();
    f.session.run(options()).await.unwrap();
    assert_eq!(
        f.session.info().camera_status,
        Some(CameraStatus::HasStream)
    );

    f.session.tick(0.0);

    // Earlier statuses were reported before the module was attached
    assert_eq!(*statuses.lock().unwrap(), vec![CameraStatus::HasVideo]);
}

#[tokio::test]
async fn test_render_requires_own_run_loop() {
    let log = new_log();
    let mut f = fixture();
    f.session.add_module(observer("m", &log)).unwrap();
    f.session.run(options()).await.unwrap();
    f.session.tick(0.0);
    f.session.post_render_tick();
    assert!(!history(&log, "m").contains(&"onRender".to_string()));

    f.session.stop();
    f.session
        .run(options().with_own_run_loop(true))
        .await
        .unwrap();
    f.session.tick(16.0);
    f.session.post_render_tick();
    assert!(history(&log, "m").contains(&"onRender".to_string()));
}

#[tokio::test]
async fn test_own_run_loop_stops_with_session() {
    let frames = Arc::new(Mutex::new(0u32));
    let mut f = fixture_with(
        Config::from_json_str(r#"{ "target_fps": 240 }"#).unwrap(),
        VirtualCaptureDevice::new(),
        SyntheticTracker::new(),
    );
    let handle = f.session.handle();
    let counter = Arc::clone(&frames);
    f.session
        .add_module(PipelineModule::new("limit").on_update(move |_| {
            let mut frames = counter.lock().unwrap();
            *frames += 1;
            if *frames == 3 {
                handle.stop();
            }
            Ok(())
        }))
        .unwrap();
    f.session
        .run(options().with_own_run_loop(true))
        .await
        .unwrap();

    let session = Arc::new(Mutex::new(f.session));
    let mut controller = spawn_run_loop(Arc::clone(&session));
    controller.join();

    assert_eq!(*frames.lock().unwrap(), 3);
    assert_eq!(session.lock().unwrap().state(), SessionState::Stopped);
    assert_eq!(f.capture.lock().unwrap().closes, 1);
}
