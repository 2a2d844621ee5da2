//! Periodic background worker
//!
//! Each component owns exactly one of these. A worker runs its cycle, then
//! sleeps for the interval (or the error backoff) while listening for a
//! shutdown signal. A cycle in flight is never interrupted; `stop` waits a
//! bounded time for it to finish and detaches the task if it does not.
//! Each cycle runs as its own task, so a panicking cycle is logged and
//! treated like a failed one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct WorkerHandle {
    shutdown: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

/// A named, restartable periodic task
pub struct PeriodicWorker {
    name: &'static str,
    running: AtomicBool,
    handle: Mutex<Option<WorkerHandle>>,
}

impl PeriodicWorker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True while the loop task is alive
    pub fn is_running(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, |h| !h.join.is_finished())
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Returns `false` without spawning when the worker is already running.
    pub fn start<F, Fut>(&self, interval: Duration, backoff: Duration, mut cycle: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        let alive = slot.as_ref().map_or(false, |h| !h.join.is_finished());
        if self.running.swap(true, Ordering::SeqCst) && alive {
            info!(worker = self.name, "Worker already running");
            return false;
        }

        let (shutdown, mut shutdown_rx) = broadcast::channel(1);
        let name = self.name;

        let join = tokio::spawn(async move {
            info!(
                worker = name,
                interval_secs = interval.as_secs(),
                "Starting worker loop"
            );

            loop {
                let delay = match tokio::spawn(cycle()).await {
                    Ok(Ok(())) => interval,
                    Ok(Err(e)) => {
                        error!(worker = name, error = %e, "Worker cycle failed");
                        backoff
                    }
                    Err(e) => {
                        error!(worker = name, error = %e, "Worker cycle panicked");
                        backoff
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => {
                        info!(worker = name, "Shutting down worker loop");
                        break;
                    }
                }
            }
        });

        *slot = Some(WorkerHandle { shutdown, join });
        true
    }

    /// Signal the loop and wait up to `timeout` for it to exit.
    ///
    /// Calling `stop` on an idle worker is a no-op.
    pub async fn stop(&self, timeout: Duration) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.running.store(false, Ordering::SeqCst);

        let Some(handle) = handle else {
            return;
        };

        // Nobody listening means the loop already exited
        let _ = handle.shutdown.send(());

        match tokio::time::timeout(timeout, handle.join).await {
            Ok(Ok(())) => info!(worker = self.name, "Worker stopped"),
            Ok(Err(e)) => warn!(worker = self.name, error = %e, "Worker task ended abnormally"),
            Err(_) => warn!(
                worker = self.name,
                timeout_secs = timeout.as_secs(),
                "Worker did not stop in time, detaching"
            ),
        }
    }
}
