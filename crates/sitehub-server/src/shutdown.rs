//! Graceful shutdown coordination via `CancellationToken`.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on tasks.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the shutdown token and the long-lived tasks that observe it.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task that is awaited during [`graceful_shutdown`](Self::graceful_shutdown).
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.lock().push(handle);
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token and wait up to `timeout` for tracked tasks; abort
    /// whatever is still running afterwards.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn initial_state_not_shutting_down() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn token_observes_shutdown() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let finished = Arc::new(AtomicBool::new(false));
        let token = coord.token();
        let flag = finished.clone();
        coord.spawn(async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        coord.graceful_shutdown(None).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out_on_stuck_task() {
        let coord = ShutdownCoordinator::new();
        coord.spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        let started = std::time::Instant::now();
        coord.graceful_shutdown(Some(Duration::from_millis(50))).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(coord.is_shutting_down());
    }
}
