//! Graceful shutdown for the agora node.
//!
//! Waits for SIGINT/SIGTERM (or a programmatic trigger) and records it in a
//! `tokio::sync::watch` channel. The flag stays set, so a task that starts
//! waiting after shutdown was triggered returns at once.

use tokio::signal;
use tokio::sync::watch;

/// Fans a single shutdown signal out to any number of listeners.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Get a receiver whose value turns `true` once shutdown is triggered.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for SIGINT or SIGTERM, or for [`shutdown`](Self::shutdown) to be
    /// called before or during the wait, then notify every listener.
    pub async fn wait_for_signal(&self) {
        let mut programmatic = self.subscribe();
        if *programmatic.borrow_and_update() {
            return;
        }

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!("cannot install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
            _ = async { let _ = programmatic.wait_for(|triggered| *triggered).await; } => { return; }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
