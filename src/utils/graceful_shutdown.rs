use eyre::{Result, WrapErr};
use tokio::{signal, sync::watch};

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Triggered programmatically (tests, embedding applications).
    Requested,
}

/// One-shot shutdown trigger shared by the signal handler and the server.
///
/// The state lives in a `watch` channel, so a token created after the trigger fired still
/// observes it. Only the first trigger counts.
pub struct GracefulShutdown {
    shutdown_tx: watch::Sender<Option<ShutdownReason>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(None);
        Self { shutdown_tx }
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_tx.borrow().is_some()
    }

    /// Initiate shutdown. Returns `false` if it had already been initiated.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) -> bool {
        let first = self.shutdown_tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason);
            true
        });
        if first {
            tracing::info!(?reason, "Shutdown initiated");
        } else {
            tracing::warn!(?reason, "Shutdown already initiated, ignoring signal");
        }
        first
    }

    /// Wait for SIGINT or SIGTERM (Ctrl+C only on non-Unix) and trigger shutdown. Returns early
    /// if shutdown is triggered some other way.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");
        let mut token = self.shutdown_token();

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                self.trigger_shutdown(ShutdownReason::Interrupt);
            }
            result = wait_for_sigterm() => {
                result.wrap_err("Failed to register SIGTERM handler")?;
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
                self.trigger_shutdown(ShutdownReason::Terminate);
            }
            _ = token.wait_for_shutdown() => {}
        }

        tracing::debug!("Signal handler shutting down");
        Ok(())
    }

    /// Create a shutdown token that can be used to cancel operations
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.shutdown_tx.subscribe(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> std::io::Result<()> {
    std::future::pending().await
}

/// Receiving half of [`GracefulShutdown`].
#[derive(Clone)]
pub struct ShutdownToken {
    receiver: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownToken {
    pub fn is_shutdown_initiated(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// Resolve once shutdown has been triggered. If the [`GracefulShutdown`] is dropped without
    /// ever firing, this resolves with [`ShutdownReason::Requested`].
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(ShutdownReason::Requested),
            Err(_) => ShutdownReason::Requested,
        }
    }
}
