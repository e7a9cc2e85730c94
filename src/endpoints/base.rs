// Base endpoint implementation with lifecycle bookkeeping shared by servers
// and connection based clients
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

pub const SHUTDOWN_CHANNEL_SIZE: usize = 1;

/// Running flag, shutdown channel and background task of an endpoint
pub struct BaseEndpoint {
    /// Name of the endpoint
    name: String,
    /// Whether the endpoint is currently started
    running: AtomicBool,
    /// Shutdown signal channel
    shutdown_signal: Mutex<Option<mpsc::Sender<()>>>,
    /// Background task (server loop, socket reader)
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BaseEndpoint {
    #[instrument(level = "debug")]
    pub fn new(name: &str) -> Self {
        debug!(endpoint = %name, "Creating new endpoint");
        Self {
            name: name.to_string(),
            running: AtomicBool::new(false),
            shutdown_signal: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Create a shutdown channel, keeping the sender for `stop_task`
    #[instrument(skip(self), level = "debug")]
    pub async fn create_shutdown_channel(&self) -> mpsc::Receiver<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(SHUTDOWN_CHANNEL_SIZE);
        *self.shutdown_signal.lock().await = Some(shutdown_tx);
        shutdown_rx
    }

    /// Store the background task
    pub async fn set_task(&self, handle: JoinHandle<()>) {
        debug!(endpoint = %self.name, "Storing background task");
        *self.task.lock().await = Some(handle);
    }

    /// Signal shutdown and wait for the background task to finish
    #[instrument(skip(self), level = "debug")]
    pub async fn stop_task(&self) {
        if let Some(shutdown_sender) = self.shutdown_signal.lock().await.take() {
            debug!(endpoint = %self.name, "Sending shutdown signal");
            let _ = shutdown_sender.send(()).await;
        }

        if let Some(handle) = self.task.lock().await.take() {
            // graceful shutdown first, abort if the task hangs
            let abort = handle.abort_handle();
            if tokio::time::timeout(std::time::Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                debug!(endpoint = %self.name, "Aborting background task");
                abort.abort();
            }
        }

        self.set_running(false);
        info!(endpoint = %self.name, "Endpoint stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_task_signals_shutdown() {
        let base = BaseEndpoint::new("test");
        let mut shutdown = base.create_shutdown_channel().await;
        base.set_task(tokio::spawn(async move {
            let _ = shutdown.recv().await;
        }))
        .await;
        base.set_running(true);
        assert!(base.is_running());

        base.stop_task().await;
        assert!(!base.is_running());
    }
}
