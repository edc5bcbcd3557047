use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::broadcast};

use crate::ports::reloader::Reloader;

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Graceful shutdown requested (SIGTERM, SIGINT)
    Graceful,
    /// In-flight requests did not drain in time
    Force,
}

/// Process signal handling: shutdown on SIGINT/SIGTERM, route reload on SIGHUP.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
    /// How long in-flight requests may take after a shutdown signal
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Relaxed)
    }

    /// Start shutdown unless it is already under way.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!(?reason, "Shutdown initiated");
            // no receivers just means nobody is waiting yet; the flag covers them
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::warn!("Shutdown already initiated, ignoring signal");
        }
    }

    /// Listen for OS signals until a shutdown signal arrives.
    ///
    /// SIGHUP reloads routes through `reloader`; a failed reload is logged and
    /// the current table keeps serving.
    pub async fn run_signal_handler(&self, reloader: Arc<dyn Reloader>) -> Result<()> {
        let mut terminate = SignalStream::terminate()?;
        let mut hangup = SignalStream::hangup()?;
        tracing::info!("Listening for SIGINT/SIGTERM (shutdown) and SIGHUP (reload)");

        loop {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result.wrap_err("Failed to listen for Ctrl+C")?;
                    tracing::info!("Received SIGINT");
                    break;
                }
                _ = terminate.recv() => {
                    tracing::info!("Received SIGTERM");
                    break;
                }
                _ = hangup.recv() => {
                    tracing::info!("Received SIGHUP, reloading routes");
                    match reloader.reload().await {
                        Ok(routes) => tracing::info!(routes, "Routes reloaded"),
                        Err(e) => tracing::error!(error = %e, "Reload failed, keeping current routes"),
                    }
                }
            }
        }

        self.trigger_shutdown(ShutdownReason::Graceful);
        Ok(())
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        if self.is_shutdown_initiated() {
            return ShutdownReason::Graceful;
        }
        match receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => {
                tracing::warn!("Shutdown channel closed unexpectedly");
                ShutdownReason::Force
            }
        }
    }

    /// Resolves `drain_timeout` after shutdown was requested.
    pub async fn drain_deadline(&self) -> ShutdownReason {
        self.wait_for_shutdown_signal().await;
        tokio::time::sleep(self.drain_timeout).await;
        tracing::error!(timeout = ?self.drain_timeout, "Drain timeout exceeded, forcing shutdown");
        ShutdownReason::Force
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
struct SignalStream(signal::unix::Signal);

#[cfg(unix)]
impl SignalStream {
    fn terminate() -> Result<Self> {
        use signal::unix::{SignalKind, signal};
        let stream = signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
        Ok(Self(stream))
    }

    fn hangup() -> Result<Self> {
        use signal::unix::{SignalKind, signal};
        let stream = signal(SignalKind::hangup()).wrap_err("Failed to register SIGHUP handler")?;
        Ok(Self(stream))
    }

    async fn recv(&mut self) {
        self.0.recv().await;
    }
}

// Only Ctrl+C exists elsewhere.
#[cfg(not(unix))]
struct SignalStream;

#[cfg(not(unix))]
impl SignalStream {
    fn terminate() -> Result<Self> {
        Ok(Self)
    }

    fn hangup() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
