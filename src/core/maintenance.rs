//! Background maintenance thread.
//!
//! Wakes every `maintenance_interval` and runs the maintenance pass until
//! stopped. Stopping drops the wake-up channel, so the thread exits at once
//! instead of sleeping out the interval.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::global::GlobalState;

/// Handle to the running maintenance thread.
pub struct MaintenanceWorker {
    /// Dropping this wakes the thread and tells it to exit
    stop: Option<Sender<()>>,

    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Spawn the maintenance thread for `global`.
    pub fn spawn(global: Arc<GlobalState>, interval: Duration) -> io::Result<Self> {
        let (stop, wake) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("classpool-maintenance".into())
            .spawn(move || {
                #[cfg(feature = "log")]
                log::debug!("classpool maintenance started, interval={:?}", interval);

                loop {
                    match wake.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if global.is_shut_down() {
                                break;
                            }
                            global.run_maintenance();
                        }
                        // Stop requested, or the worker handle is gone.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                #[cfg(feature = "log")]
                log::debug!("classpool maintenance stopped");
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            // The pass cannot panic; a join error carries nothing to act on.
            let _ = handle.join();
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
