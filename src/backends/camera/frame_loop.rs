// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for the session's own run loop
//!
//! When a session is started with `owns_run_loop`, nothing outside the crate
//! calls `tick`/`post_render_tick`. The [`FrameLoopController`] runs a paced
//! loop on a dedicated thread and hands each iteration a monotonic timestamp
//! in milliseconds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the frame callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a frame loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = FrameLoopController::start("run-loop", Duration::from_millis(16), |ts| {
///     session.tick(ts);
///     session.post_render_tick();
///     LoopAction::Continue
/// });
///
/// // Later, stop the loop
/// controller.stop();
/// ```
pub struct FrameLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl FrameLoopController {
    /// Start a new frame loop in a separate thread
    ///
    /// The closure is called once per frame with the elapsed time since the
    /// loop started, in milliseconds. Frames are paced to `frame_interval`;
    /// a frame that overruns its budget is followed immediately by the next.
    ///
    /// # Arguments
    ///
    /// * `name` - A descriptive name for the loop (used in logging)
    /// * `frame_interval` - Target time between frame starts
    /// * `frame_fn` - A closure that runs one frame
    pub fn start<F>(name: &str, frame_interval: Duration, mut frame_fn: F) -> Self
    where
        F: FnMut(f64) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, interval_ms = frame_interval.as_millis() as u64, "Starting frame loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Frame loop thread started");
            let epoch = Instant::now();

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                let frame_start = Instant::now();
                let timestamp_ms = epoch.elapsed().as_secs_f64() * 1000.0;

                match frame_fn(timestamp_ms) {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }

                if let Some(remaining) = frame_interval.checked_sub(frame_start.elapsed()) {
                    thread::sleep(remaining);
                }
            }

            info!(name = %name_clone, "Frame loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting frame loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    ///
    /// Useful if the loop stops itself via `LoopAction::Stop`.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for frame loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Frame loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Frame loop thread finished");
            }
        }
    }
}

impl Drop for FrameLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "FrameLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = FrameLoopController::start("test-loop", Duration::ZERO, move |_| {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        controller.join();

        assert_eq!(counter.load(Ordering::SeqCst), 11); // 0-10 inclusive
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let stamps_clone = Arc::clone(&stamps);

        let mut controller =
            FrameLoopController::start("test-stamps", Duration::from_millis(1), move |ts| {
                let mut stamps = stamps_clone.lock().unwrap();
                stamps.push(ts);
                if stamps.len() >= 5 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            });

        controller.join();

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 5);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            FrameLoopController::start("test-loop", Duration::from_millis(10), move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            });

        thread::sleep(Duration::from_millis(50));

        controller.stop();
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_is_running() {
        let controller =
            FrameLoopController::start("test-running", Duration::from_millis(100), |_| {
                LoopAction::Continue
            });

        assert!(controller.is_running());

        // Drop will stop it
        drop(controller);
    }
}
