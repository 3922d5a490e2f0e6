// SPDX-License-Identifier: GPL-3.0-only

//! Session state and the cross-thread control queue
//!
//! `SessionHandle`s never touch the registry or the device directly. They
//! push a [`Request`] onto the shared queue, which the tick thread drains at
//! the next tick boundary. State is mirrored here so handles can read it
//! while `run` is awaiting module initialization.

use super::module::{ModuleRef, PipelineModule};
use crate::backends::camera::DeviceEvent;
use crate::backends::tracking::{CameraProjectionUpdate, TrackingOptions};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Running,
    Paused,
}

impl SessionState {
    /// Whether modules may be attached in this state
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Running => write!(f, "running"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// Work queued by a `SessionHandle`
pub(crate) enum Request {
    Add(PipelineModule),
    Remove(ModuleRef),
    Clear,
    Pause,
    Resume,
    Stop,
    Notify(DeviceEvent),
    UpdateCamera(CameraProjectionUpdate),
    Recenter,
    ConfigureTracking(TrackingOptions),
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Add(module) => write!(f, "Add({})", module.name()),
            Request::Remove(target) => write!(f, "Remove({})", target.name()),
            Request::Clear => write!(f, "Clear"),
            Request::Pause => write!(f, "Pause"),
            Request::Resume => write!(f, "Resume"),
            Request::Stop => write!(f, "Stop"),
            Request::Notify(event) => write!(f, "Notify({:?})", event),
            Request::UpdateCamera(update) => write!(f, "UpdateCamera({:?})", update),
            Request::Recenter => write!(f, "Recenter"),
            Request::ConfigureTracking(options) => write!(f, "ConfigureTracking({:?})", options),
        }
    }
}

/// State shared between a session and its handles
#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<SessionState>,
    queue: Mutex<VecDeque<Request>>,
    stop_requested: AtomicBool,
    stop_signal: tokio::sync::Notify,
}

impl Shared {
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: SessionState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!(from = %*current, to = %state, "Session state change");
            *current = state;
        }
    }

    pub fn push(&self, request: Request) {
        let stop = matches!(request, Request::Stop);
        if stop {
            self.stop_requested.store(true, Ordering::SeqCst);
        }
        debug!(?request, "Queueing session request");
        lock(&self.queue).push_back(request);
        if stop {
            self.stop_signal.notify_one();
        }
    }

    /// Take every queued request in FIFO order
    pub fn drain(&self) -> Vec<Request> {
        lock(&self.queue).drain(..).collect()
    }

    /// Whether a stop is queued and not yet applied
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Resolves once a stop is queued
    ///
    /// A wakeup left over from an already applied stop only re-checks the
    /// flag, so this does not resolve early.
    pub async fn stop_signalled(&self) {
        loop {
            let notified = self.stop_signal.notified();
            if self.stop_requested() {
                return;
            }
            notified.await;
        }
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Targets of removals queued since the last drain
    pub fn pending_removals(&self) -> Vec<ModuleRef> {
        lock(&self.queue)
            .iter()
            .filter_map(|r| match r {
                Request::Remove(target) => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether a `Clear` is queued
    pub fn clear_pending(&self) -> bool {
        lock(&self.queue).iter().any(|r| matches!(r, Request::Clear))
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Session control mutex poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo_and_tracks_stop() {
        let shared = Shared::default();
        shared.push(Request::Pause);
        shared.push(Request::Remove(ModuleRef::from("a")));
        shared.push(Request::Stop);

        assert!(shared.stop_requested());
        assert_eq!(shared.pending_removals(), vec![ModuleRef::from("a")]);

        let drained = shared.drain();
        assert!(matches!(drained[0], Request::Pause));
        assert!(matches!(drained[1], Request::Remove(_)));
        assert!(matches!(drained[2], Request::Stop));
        assert!(shared.drain().is_empty());
    }

    #[tokio::test]
    async fn test_stop_signal_wakes_waiter_from_another_thread() {
        let shared = std::sync::Arc::new(Shared::default());
        let pusher = std::sync::Arc::clone(&shared);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            pusher.push(Request::Stop);
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), shared.stop_signalled())
            .await
            .expect("stop signal never arrived");
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn test_applied_stop_does_not_leave_signal_raised() {
        let shared = Shared::default();
        shared.push(Request::Stop);
        shared.drain();
        shared.clear_stop();

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            shared.stop_signalled(),
        )
        .await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_state_defaults_to_stopped() {
        let shared = Shared::default();
        assert_eq!(shared.state(), SessionState::Stopped);
        assert!(!SessionState::Stopped.is_active());
        assert!(SessionState::Paused.is_active());
        shared.set_state(SessionState::Running);
        assert_eq!(shared.state().to_string(), "running");
    }
}
