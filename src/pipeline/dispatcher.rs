// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle callback dispatch
//!
//! Every callback invocation goes through [`invoke`], which turns both
//! returned errors and panics into a [`StageError`]. Faults are reported to
//! the `onException` slot of every attached module; a fault inside
//! `onException` is logged and dropped.

use super::info::SessionInfo;
use super::module::{BeforeRunFuture, CallbackKind};
use super::registry::{Attachment, ModuleRegistry, RegisteredModule};
use crate::backends::camera::{CameraStatus, DeviceEvent, DeviceOrientation, Dimensions};
use crate::errors::{CallbackResult, ModuleInitError, StageError};
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Session-wide events delivered to modules
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LifecycleEvent<'a> {
    Start,
    Paused,
    Resume,
    CameraStatusChange(&'a CameraStatus),
    CanvasSizeChange(Dimensions),
    DeviceOrientationChange(DeviceOrientation),
    VideoSizeChange(Dimensions),
    AppResourcesLoaded,
}

impl<'a> LifecycleEvent<'a> {
    pub fn kind(&self) -> CallbackKind {
        match self {
            LifecycleEvent::Start => CallbackKind::Start,
            LifecycleEvent::Paused => CallbackKind::Paused,
            LifecycleEvent::Resume => CallbackKind::Resume,
            LifecycleEvent::CameraStatusChange(_) => CallbackKind::CameraStatusChange,
            LifecycleEvent::CanvasSizeChange(_) => CallbackKind::CanvasSizeChange,
            LifecycleEvent::DeviceOrientationChange(_) => CallbackKind::DeviceOrientationChange,
            LifecycleEvent::VideoSizeChange(_) => CallbackKind::VideoSizeChange,
            LifecycleEvent::AppResourcesLoaded => CallbackKind::AppResourcesLoaded,
        }
    }

    pub fn from_device(event: &'a DeviceEvent) -> Self {
        match event {
            DeviceEvent::CameraStatusChange(status) => LifecycleEvent::CameraStatusChange(status),
            DeviceEvent::DeviceOrientationChange(o) => LifecycleEvent::DeviceOrientationChange(*o),
            DeviceEvent::CanvasSizeChange(size) => LifecycleEvent::CanvasSizeChange(*size),
            DeviceEvent::VideoSizeChange(size) => LifecycleEvent::VideoSizeChange(*size),
            DeviceEvent::AppResourcesLoaded => LifecycleEvent::AppResourcesLoaded,
        }
    }

    /// `onStart` reaches every registered module; it precedes `onAttach`
    fn reaches_detached(&self) -> bool {
        matches!(self, LifecycleEvent::Start)
    }
}

/// Run one callback, converting errors and panics into a [`StageError`]
pub(crate) fn invoke<T>(
    module: &str,
    callback: CallbackKind,
    f: impl FnOnce() -> CallbackResult<T>,
) -> Result<T, StageError> {
    trace!(module = %module, callback = %callback, "Invoking callback");
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StageError {
            module: module.to_string(),
            callback,
            message: e.to_string(),
        }),
        Err(payload) => Err(StageError {
            module: module.to_string(),
            callback,
            message: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Dispatches lifecycle callbacks across the registry in order
#[derive(Debug, Default)]
pub struct LifecycleDispatcher {
    faults_reported: u64,
}

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of faults routed to `onException` so far
    pub fn faults_reported(&self) -> u64 {
        self.faults_reported
    }

    /// Invoke the event's callback on every eligible module in registry order
    ///
    /// Faults are reported through `onException` before returning.
    pub(crate) fn dispatch(
        &mut self,
        registry: &mut ModuleRegistry,
        event: LifecycleEvent<'_>,
        info: &SessionInfo,
    ) -> Vec<StageError> {
        let faults = invoke_all(registry, event, info);
        for fault in &faults {
            self.report_exception(registry, fault);
        }
        faults
    }

    /// Dispatch `onStart`, then attach every detached module
    ///
    /// Faults from both passes are held back until the attach pass is over,
    /// so they reach the `onException` of modules attached by it.
    pub(crate) fn start_all(
        &mut self,
        registry: &mut ModuleRegistry,
        info: &SessionInfo,
    ) -> Vec<StageError> {
        let mut faults = invoke_all(registry, LifecycleEvent::Start, info);
        for index in 0..registry.len() {
            if let Err(e) = try_attach(registry, index, info) {
                warn!(error = %e, "Module failed to attach");
                faults.push(e);
            }
        }
        for fault in &faults {
            self.report_exception(registry, fault);
        }
        faults
    }

    /// Call `onAttach` on the module at `index`
    ///
    /// The module counts as attached only once the callback returns
    /// successfully. Returns whether it is attached afterwards.
    pub(crate) fn attach(
        &mut self,
        registry: &mut ModuleRegistry,
        index: usize,
        info: &SessionInfo,
    ) -> bool {
        match try_attach(registry, index, info) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Module failed to attach");
                self.report_exception(registry, &e);
                false
            }
        }
    }

    /// Call `onDetach` on the module at `index` if it is attached
    ///
    /// The module is detached even if the callback fails.
    pub(crate) fn detach(
        &mut self,
        registry: &mut ModuleRegistry,
        index: usize,
        info: &SessionInfo,
    ) {
        let entry = registry.entry_mut(index);
        if !entry.is_attached() {
            return;
        }

        let name = entry.name().to_string();
        let result = match entry.module.callbacks.detach.as_mut() {
            Some(cb) => invoke(&name, CallbackKind::Detach, || cb(info)),
            None => Ok(()),
        };
        entry.attachment = Attachment::Detached;
        info!(module = %name, "Module detached");

        if let Err(e) = result {
            warn!(error = %e, "Module failed to detach cleanly");
            self.report_exception(registry, &e);
        }
    }

    /// Detach every attached module in registry order
    pub(crate) fn detach_all(&mut self, registry: &mut ModuleRegistry, info: &SessionInfo) {
        for index in 0..registry.len() {
            self.detach(registry, index, info);
        }
    }

    /// Deliver `error` to the `onException` slot of every attached module
    pub(crate) fn report_exception(&mut self, registry: &mut ModuleRegistry, error: &StageError) {
        self.faults_reported += 1;
        warn!(module = %error.module, callback = %error.callback, message = %error.message, "Module fault");

        for entry in registry.entries_mut() {
            if !entry.is_attached() {
                continue;
            }
            let name = entry.name().to_string();
            if let Some(cb) = entry.module.callbacks.exception.as_mut() {
                if let Err(e) = invoke(&name, CallbackKind::Exception, || cb(error)) {
                    error!(error = %e, "onException failed; ignoring");
                }
            }
        }
    }

    /// Call `onBeforeRun` on every registered module and collect the futures
    ///
    /// Collection stops at the first module whose callback fails before
    /// returning a future. That failure is returned alongside the futures
    /// already collected, which still have to be awaited.
    pub(crate) fn collect_before_run(
        &mut self,
        registry: &mut ModuleRegistry,
        info: &SessionInfo,
    ) -> (Vec<(String, BeforeRunFuture)>, Option<ModuleInitError>) {
        let mut tasks = Vec::new();
        for entry in registry.entries_mut() {
            let name = entry.name().to_string();
            let Some(cb) = entry.module.callbacks.before_run.as_mut() else {
                continue;
            };
            match invoke(&name, CallbackKind::BeforeRun, || Ok(cb(info))) {
                Ok(future) => tasks.push((name, future)),
                Err(e) => {
                    warn!(error = %e, pending = tasks.len(), "onBeforeRun failed before returning");
                    return (
                        tasks,
                        Some(ModuleInitError {
                            module: name,
                            reason: e.message,
                        }),
                    );
                }
            }
        }
        debug!(count = tasks.len(), "Collected onBeforeRun futures");
        (tasks, None)
    }
}

/// Invoke the event's callback on every eligible module, collecting faults
fn invoke_all(
    registry: &mut ModuleRegistry,
    event: LifecycleEvent<'_>,
    info: &SessionInfo,
) -> Vec<StageError> {
    debug!(event = %event.kind(), "Dispatching lifecycle event");
    let mut faults = Vec::new();
    for entry in registry.entries_mut() {
        if !entry.is_attached() && !event.reaches_detached() {
            continue;
        }
        if let Err(e) = invoke_event(entry, event, info) {
            faults.push(e);
        }
    }
    faults
}

/// Run `onAttach` for the module at `index` without reporting a failure
fn try_attach(
    registry: &mut ModuleRegistry,
    index: usize,
    info: &SessionInfo,
) -> Result<(), StageError> {
    let entry = registry.entry_mut(index);
    if entry.is_attached() {
        return Ok(());
    }

    let name = entry.name().to_string();
    if let Some(cb) = entry.module.callbacks.attach.as_mut() {
        invoke(&name, CallbackKind::Attach, || cb(info))?;
    }
    entry.attachment = Attachment::Attached;
    info!(module = %name, "Module attached");
    Ok(())
}

fn invoke_event(
    entry: &mut RegisteredModule,
    event: LifecycleEvent<'_>,
    info: &SessionInfo,
) -> Result<(), StageError> {
    let name = entry.name().to_string();
    let kind = event.kind();
    let c = &mut entry.module.callbacks;
    match event {
        LifecycleEvent::Start => call_opt(&name, kind, c.start.as_mut(), |cb| cb(info)),
        LifecycleEvent::Paused => call_opt(&name, kind, c.paused.as_mut(), |cb| cb(info)),
        LifecycleEvent::Resume => call_opt(&name, kind, c.resume.as_mut(), |cb| cb(info)),
        LifecycleEvent::AppResourcesLoaded => {
            call_opt(&name, kind, c.app_resources_loaded.as_mut(), |cb| cb(info))
        }
        LifecycleEvent::CameraStatusChange(status) => {
            call_opt(&name, kind, c.camera_status_change.as_mut(), |cb| cb(status))
        }
        LifecycleEvent::CanvasSizeChange(size) => {
            call_opt(&name, kind, c.canvas_size_change.as_mut(), |cb| cb(size))
        }
        LifecycleEvent::DeviceOrientationChange(orientation) => call_opt(
            &name,
            kind,
            c.device_orientation_change.as_mut(),
            |cb| cb(orientation),
        ),
        LifecycleEvent::VideoSizeChange(size) => {
            call_opt(&name, kind, c.video_size_change.as_mut(), |cb| cb(size))
        }
    }
}

fn call_opt<C: ?Sized>(
    module: &str,
    kind: CallbackKind,
    slot: Option<&mut Box<C>>,
    call: impl FnOnce(&mut Box<C>) -> CallbackResult,
) -> Result<(), StageError> {
    match slot {
        Some(cb) => invoke(module, kind, || call(cb)),
        None => Ok(()),
    }
}

/// Drive every `onBeforeRun` future to completion
///
/// All futures are awaited even after one fails, so modules can finish their
/// cleanup. The first failure in completion order is returned. With a
/// `timeout`, the first module (in registry order) still pending when it
/// expires is reported as failed; the timeout requires a tokio runtime.
pub(crate) async fn join_before_run(
    tasks: Vec<(String, BeforeRunFuture)>,
    timeout: Option<Duration>,
) -> Result<(), ModuleInitError> {
    let mut remaining: Vec<String> = tasks.iter().map(|(name, _)| name.clone()).collect();
    let mut first_failure: Option<ModuleInitError> = None;

    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(name, future)| async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            (name, outcome)
        })
        .collect();

    let drain = async {
        while let Some((name, outcome)) = pending.next().await {
            remaining.retain(|n| n != &name);
            let reason = match outcome {
                Ok(Ok(())) => {
                    debug!(module = %name, "onBeforeRun settled");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            warn!(module = %name, reason = %reason, "onBeforeRun failed");
            if first_failure.is_none() {
                first_failure = Some(ModuleInitError {
                    module: name,
                    reason,
                });
            }
        }
    };

    let timed_out = match timeout {
        Some(limit) => tokio::time::timeout(limit, drain).await.is_err(),
        None => {
            drain.await;
            false
        }
    };

    if timed_out && first_failure.is_none() {
        if let Some(module) = remaining.first() {
            warn!(module = %module, "onBeforeRun timed out");
            first_failure = Some(ModuleInitError {
                module: module.clone(),
                reason: format!("timed out after {:?}", timeout.unwrap_or_default()),
            });
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::tracking::TrackingConfig;
    use crate::errors::ModuleFault;
    use crate::pipeline::module::PipelineModule;
    use std::sync::{Arc, Mutex};

    fn info() -> SessionInfo {
        SessionInfo::new(TrackingConfig::default())
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> PipelineModule {
        let (l1, l2, l3) = (Arc::clone(log), Arc::clone(log), Arc::clone(log));
        let (n1, n2, n3) = (name.to_string(), name.to_string(), name.to_string());
        PipelineModule::new(name)
            .on_attach(move |_| {
                l1.lock().unwrap().push(format!("{}:attach", n1));
                Ok(())
            })
            .on_paused(move |_| {
                l2.lock().unwrap().push(format!("{}:paused", n2));
                Ok(())
            })
            .on_exception(move |e| {
                l3.lock().unwrap().push(format!("{}:exception:{}", n3, e.module));
                Ok(())
            })
    }

    #[test]
    fn test_dispatch_in_registry_order_to_attached_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        let mut dispatcher = LifecycleDispatcher::new();
        registry.insert(recorder(&log, "a")).unwrap();
        registry.insert(recorder(&log, "b")).unwrap();
        registry.insert(recorder(&log, "c")).unwrap();

        dispatcher.attach(&mut registry, 0, &info());
        dispatcher.attach(&mut registry, 2, &info());
        log.lock().unwrap().clear();

        dispatcher.dispatch(&mut registry, LifecycleEvent::Paused, &info());
        assert_eq!(*log.lock().unwrap(), vec!["a:paused", "c:paused"]);
    }

    #[test]
    fn test_panicking_callback_reported_to_exception() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        let mut dispatcher = LifecycleDispatcher::new();
        registry.insert(recorder(&log, "observer")).unwrap();
        registry
            .insert(PipelineModule::new("faulty").on_paused(|_| panic!("boom")))
            .unwrap();
        dispatcher.start_all(&mut registry, &info());

        let faults = dispatcher.dispatch(&mut registry, LifecycleEvent::Paused, &info());

        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].callback, CallbackKind::Paused);
        assert!(faults[0].message.contains("boom"));
        assert!(
            log.lock()
                .unwrap()
                .contains(&"observer:exception:faulty".to_string())
        );
        assert_eq!(dispatcher.faults_reported(), 1);
    }

    #[test]
    fn test_failing_exception_handler_is_swallowed() {
        let mut registry = ModuleRegistry::new();
        let mut dispatcher = LifecycleDispatcher::new();
        registry
            .insert(
                PipelineModule::new("grumpy")
                    .on_paused(|_| Err("paused failed".into()))
                    .on_exception(|_| Err("exception failed".into())),
            )
            .unwrap();
        dispatcher.start_all(&mut registry, &info());

        let faults = dispatcher.dispatch(&mut registry, LifecycleEvent::Paused, &info());
        // Only the original fault counts; the onException failure is dropped
        assert_eq!(faults.len(), 1);
        assert_eq!(dispatcher.faults_reported(), 1);
    }

    #[test]
    fn test_failed_attach_leaves_module_detached() {
        let mut registry = ModuleRegistry::new();
        let mut dispatcher = LifecycleDispatcher::new();
        registry
            .insert(PipelineModule::new("m").on_attach(|_| Err("no gpu".into())))
            .unwrap();

        assert!(!dispatcher.attach(&mut registry, 0, &info()));
        assert_eq!(registry.attachment("m"), Some(Attachment::Detached));
    }

    #[test]
    fn test_start_faults_reported_after_attach_pass() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        let mut dispatcher = LifecycleDispatcher::new();
        registry
            .insert(PipelineModule::new("bad").on_start(|_| Err("boom".into())))
            .unwrap();
        registry.insert(recorder(&log, "watcher")).unwrap();

        let faults = dispatcher.start_all(&mut registry, &info());

        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].callback, CallbackKind::Start);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["watcher:attach", "watcher:exception:bad"]
        );
        assert_eq!(registry.attachment("bad"), Some(Attachment::Attached));
    }

    #[test]
    fn test_collect_before_run_returns_futures_gathered_before_a_failure() {
        let mut registry = ModuleRegistry::new();
        let mut dispatcher = LifecycleDispatcher::new();
        registry
            .insert(
                PipelineModule::new("first")
                    .on_before_run(|_| async { Ok::<(), ModuleFault>(()) }),
            )
            .unwrap();
        registry
            .insert(PipelineModule::new("broken").on_before_run(|_| {
                if true {
                    panic!("bad config");
                }
                async { Ok::<(), ModuleFault>(()) }
            }))
            .unwrap();
        registry
            .insert(
                PipelineModule::new("last")
                    .on_before_run(|_| async { Ok::<(), ModuleFault>(()) }),
            )
            .unwrap();

        let (tasks, failure) = dispatcher.collect_before_run(&mut registry, &info());

        let names: Vec<&str> = tasks.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["first"]);
        let failure = failure.unwrap();
        assert_eq!(failure.module, "broken");
        assert!(failure.reason.contains("bad config"));
    }

    #[tokio::test]
    async fn test_join_before_run_awaits_all_and_reports_first_failure() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let f1 = Arc::clone(&finished);
        let slow_ok: BeforeRunFuture = async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            f1.lock().unwrap().push("slow");
            Ok::<(), ModuleFault>(())
        }
        .boxed();
        let fast_err: BeforeRunFuture =
            async { Err::<(), ModuleFault>("missing model".into()) }.boxed();

        let result = join_before_run(
            vec![("slow".to_string(), slow_ok), ("fast".to_string(), fast_err)],
            None,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.module, "fast");
        assert_eq!(err.reason, "missing model");
        // The slow future still ran to completion
        assert_eq!(*finished.lock().unwrap(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_join_before_run_timeout() {
        let never: BeforeRunFuture = futures::future::pending::<CallbackResult>().boxed();
        let err = join_before_run(
            vec![("stuck".to_string(), never)],
            Some(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();

        assert_eq!(err.module, "stuck");
        assert!(err.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_join_before_run_panic_is_failure() {
        let panicking: BeforeRunFuture = async {
            if true {
                panic!("wasm load crashed");
            }
            Ok::<(), ModuleFault>(())
        }
        .boxed();
        let err = join_before_run(vec![("loader".to_string(), panicking)], None)
            .await
            .unwrap_err();
        assert!(err.reason.contains("wasm load crashed"));
    }
}
