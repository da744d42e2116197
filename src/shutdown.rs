//! Cooperative shutdown for background tasks
//!
//! Every task started during bootstrap receives a clone of the same
//! [`ShutdownSignal`] and leaves its loop once the signal fires. Without a
//! trigger the tasks simply run until process exit.

use tokio::sync::watch;
use tracing::info;

/// Shutdown signal that can be cloned and shared across tasks
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: std::sync::Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: std::sync::Arc::new(sender),
            receiver,
        }
    }

    /// Check if shutdown has been triggered
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Trigger shutdown; later calls are no-ops
    pub fn trigger(&self) {
        let changed = self.sender.send_if_modified(|v| !std::mem::replace(v, true));
        if changed {
            info!("Shutdown signal triggered");
        }
    }

    /// Resolve once shutdown has been triggered, immediately if it already was
    pub async fn wait(&self) {
        let mut rx = self.receiver.clone();
        // The sender lives as long as any clone of self, so this cannot fail
        let _ = rx.wait_for(|v| *v).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT/SIGTERM (Ctrl+C elsewhere) and trigger the signal
pub async fn listen_for_shutdown_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }

    shutdown.trigger();
}
