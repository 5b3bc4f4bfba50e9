//! Background receive loop
//!
//! One dedicated thread per live link, repeatedly polling the link's bounded
//! receive and emitting `Data` events. Shutdown is a stop flag the loop
//! observes within one poll interval; the subsequent join is bounded by that
//! same interval in practice, not a guaranteed kill (a blocking read cannot
//! be interrupted mid-call).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// One step of the receive loop
pub(crate) enum LoopStep {
    Continue,
    Stop,
}

/// Handle to a spawned receive loop
pub(crate) struct ReceiveLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Spawn the loop; `poll` performs one bounded receive attempt and
    /// reports whether the loop should keep running
    pub(crate) fn spawn<F>(mut poll: F) -> Self
    where
        F: FnMut() -> LoopStep + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                if let LoopStep::Stop = poll() {
                    break;
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for it to finish
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
