//! Shared task registry for background work.
//!
//! Centralizes tracking of polling loops so that shutting the application
//! core down stops every one of them.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owns spawned tasks; aborts them on [`shutdown`](Self::shutdown) or drop.
#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `fut`, racing it against registry shutdown.
    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Number of tasks that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signal shutdown and abort every tracked task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_pending_tasks() {
        let registry = TaskRegistry::new();
        registry.spawn_cancellable(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert_eq!(registry.active_count(), 1);

        registry.shutdown();
        assert!(registry.is_shut_down());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn finished_tasks_are_pruned_on_spawn() {
        let registry = TaskRegistry::new();
        registry.spawn_cancellable(async {});
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.spawn_cancellable(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert_eq!(registry.active_count(), 1);
        registry.shutdown();
    }
}
