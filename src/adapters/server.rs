//! Listener ownership, connection serving and graceful drain.
use std::{future::Future, io, sync::Arc, time::Duration};

use axum::{Router, extract::ConnectInfo};
use hyper::{Request, body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful},
};
use tokio::{net::TcpListener, sync::watch, task::JoinSet};
use tower::ServiceExt;
use tracing::Instrument;

use crate::{
    core::lifecycle::{DrainOutcome, LifecycleError, LifecycleState},
    ports::event_sink::{EventKind, EventSink, GatewayEvent},
    utils::graceful_shutdown::ShutdownReason,
};

/// Drives the gateway through `Stopped → Starting → Running → Draining → Stopped`.
///
/// Each accepted connection is served on its own task. When the shutdown future resolves the
/// listener is dropped, open connections are told to finish their current request, and
/// whatever is still running after the grace period is aborted.
pub struct GatewayServer {
    state: watch::Sender<LifecycleState>,
    grace_period: Duration,
    events: Arc<dyn EventSink>,
}

impl GatewayServer {
    pub fn new(grace_period: Duration, events: Arc<dyn EventSink>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Self {
            state,
            grace_period,
            events,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state changes, e.g. to wait for `Running` before sending traffic.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Bind the listening socket. Failure is returned as-is, never retried, and leaves the
    /// server `Stopped`.
    pub async fn bind(&self, addr: &str) -> Result<TcpListener, LifecycleError> {
        self.transition(LifecycleState::Starting)?;
        match TcpListener::bind(addr).await {
            Ok(listener) => Ok(listener),
            Err(source) => {
                self.transition(LifecycleState::Stopped)?;
                Err(LifecycleError::Bind {
                    addr: addr.to_string(),
                    source,
                })
            }
        }
    }

    /// Serve `app` on `listener` until `shutdown` resolves, then drain.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        app: Router,
        shutdown: F,
    ) -> Result<DrainOutcome, LifecycleError>
    where
        F: Future<Output = ShutdownReason>,
    {
        self.transition(LifecycleState::Running)?;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(listen_addr = %addr, "Gateway listening");
        }

        let builder = auto::Builder::new(TokioExecutor::new());
        let watcher = graceful::GracefulShutdown::new();
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown => break reason,
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            if let Some(backoff) = accept_backoff(&e) {
                                tokio::select! {
                                    reason = &mut shutdown => break reason,
                                    _ = tokio::time::sleep(backoff) => {}
                                }
                            }
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(client.addr = %remote_addr, "Failed to set TCP_NODELAY: {}", e);
                    }

                    let app = app.clone();
                    let service = service_fn(move |mut req: Request<Incoming>| {
                        req.extensions_mut().insert(ConnectInfo(remote_addr));
                        app.clone().oneshot(req)
                    });
                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .into_owned();
                    let conn = watcher.watch(conn);

                    let span = tracing::debug_span!("connection", client.addr = %remote_addr);
                    connections.spawn(
                        async move {
                            if let Err(e) = conn.await {
                                tracing::debug!("Connection closed with error: {}", e);
                            }
                        }
                        .instrument(span),
                    );
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        drop(listener);
        self.transition(LifecycleState::Draining)?;
        tracing::info!(
            ?reason,
            grace_period = ?self.grace_period,
            open_connections = connections.len(),
            "Shutdown signal received, draining connections"
        );

        let outcome = match tokio::time::timeout(self.grace_period, watcher.shutdown()).await {
            Ok(()) => {
                while connections.join_next().await.is_some() {}
                tracing::info!("All connections drained");
                DrainOutcome::Completed
            }
            Err(elapsed) => {
                connections.abort_all();
                let mut abandoned = 0;
                while let Some(result) = connections.join_next().await {
                    if matches!(result, Err(ref e) if e.is_cancelled()) {
                        abandoned += 1;
                    }
                }
                self.events
                    .emit(&GatewayEvent::new(EventKind::ShutdownTimeout, "").error(&elapsed));
                tracing::warn!(abandoned, "Forcibly closed remaining connections");
                DrainOutcome::ForcedClose { abandoned }
            }
        };

        self.transition(LifecycleState::Stopped)?;
        Ok(outcome)
    }

    /// [`bind`](Self::bind) then [`serve`](Self::serve).
    pub async fn run<F>(
        &self,
        addr: &str,
        app: Router,
        shutdown: F,
    ) -> Result<DrainOutcome, LifecycleError>
    where
        F: Future<Output = ShutdownReason>,
    {
        let listener = self.bind(addr).await?;
        self.serve(listener, app, shutdown).await
    }

    fn transition(&self, next: LifecycleState) -> Result<(), LifecycleError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                tracing::debug!(from = ?*state, to = ?next, "Lifecycle transition");
                *state = next;
                true
            } else {
                result = Err(LifecycleError::InvalidTransition {
                    from: *state,
                    to: next,
                });
                false
            }
        });
        result
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Per-connection errors (reset before accept completed) are routine. Anything else, such as
/// running out of file descriptors, gets a short back-off so the loop does not spin.
fn accept_backoff(e: &io::Error) -> Option<Duration> {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    ) {
        tracing::debug!("Accept error: {}", e);
        return None;
    }
    tracing::error!("Accept error: {}", e);
    Some(ACCEPT_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::event_sink::TracingEventSink;

    fn server() -> GatewayServer {
        GatewayServer::new(Duration::from_secs(1), Arc::new(TracingEventSink))
    }

    #[tokio::test]
    async fn test_bind_failure_returns_to_stopped() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap().to_string();

        let server = server();
        let err = server.bind(&addr).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Bind { .. }));
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_idle_server_drains_immediately() {
        let server = server();
        let mut states = server.subscribe();
        let listener = server.bind("127.0.0.1:0").await.unwrap();
        assert_eq!(server.state(), LifecycleState::Starting);

        let outcome = server
            .serve(listener, Router::new(), async {
                ShutdownReason::Requested
            })
            .await
            .unwrap();

        assert_eq!(outcome, DrainOutcome::Completed);
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);
    }

    #[test]
    fn test_accept_backoff_only_for_listener_errors() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(accept_backoff(&reset), None);

        let exhausted = io::Error::other("Too many open files");
        assert_eq!(accept_backoff(&exhausted), Some(ACCEPT_BACKOFF));
    }

    #[tokio::test]
    async fn test_serve_requires_bind() {
        let server = server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = server
            .serve(listener, Router::new(), async { ShutdownReason::Requested })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}
