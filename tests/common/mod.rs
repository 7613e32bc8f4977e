//! Shared fixtures: mock backends on ephemeral ports and an in-process gateway.
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use pollpulse_gateway::{
    DrainOutcome, GatewayServer, HttpClientAdapter, HttpHandler, LifecycleState, ProxyDispatcher,
    RouteRegistry, TracingEventSink,
    config::{CorsConfig, RouteDefinition},
    core::LifecycleError,
    utils::{GracefulShutdown, ShutdownReason},
};
use tokio::{net::TcpListener, sync::Notify, sync::watch, task::JoinHandle};

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
}

struct BackendState {
    name: &'static str,
    delay: Duration,
    requests: Mutex<Vec<CapturedRequest>>,
    received: Notify,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Resolves once the backend has received a request (each request stores one permit).
    pub async fn wait_for_request(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.state.received.notified())
            .await
            .expect("backend never received a request");
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Echo backend: answers `200` with body `<name> <path?query>`, or with `418` for paths ending
/// in `/teapot`.
pub async fn spawn_backend(name: &'static str) -> MockBackend {
    spawn_backend_with_delay(name, Duration::ZERO).await
}

pub async fn spawn_backend_with_delay(name: &'static str, delay: Duration) -> MockBackend {
    let state = Arc::new(BackendState {
        name,
        delay,
        requests: Mutex::new(Vec::new()),
        received: Notify::new(),
    });

    let app = Router::new()
        .fallback(backend_handler)
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        addr,
        state,
        handle,
    }
}

async fn backend_handler(State(state): State<Arc<BackendState>>, req: Request) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();

    state.requests.lock().unwrap().push(CapturedRequest {
        method: req.method().to_string(),
        path_and_query: path_and_query.clone(),
        headers: req.headers().clone(),
    });
    state.received.notify_one();

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let status = if req.uri().path().ends_with("/teapot") {
        StatusCode::IM_A_TEAPOT
    } else {
        StatusCode::OK
    };

    Response::builder()
        .status(status)
        .header("x-backend-name", state.name)
        .body(Body::from(format!("{} {}", state.name, path_and_query)))
        .unwrap()
}

/// A base URL nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Arc<GracefulShutdown>,
    pub state: watch::Receiver<LifecycleState>,
    pub handle: JoinHandle<Result<DrainOutcome, LifecycleError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger_shutdown(ShutdownReason::Requested);
    }

    pub async fn wait_for_state(&mut self, wanted: LifecycleState) {
        tokio::time::timeout(
            Duration::from_secs(5),
            self.state.wait_for(|state| *state == wanted),
        )
        .await
        .expect("gateway never reached the expected state")
        .unwrap();
    }

    pub async fn stopped(self) -> DrainOutcome {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("gateway did not stop")
            .unwrap()
            .unwrap()
    }
}

pub async fn spawn_gateway(routes: Vec<RouteDefinition>) -> TestGateway {
    spawn_gateway_with(routes, Duration::from_secs(60), Duration::from_secs(5)).await
}

pub async fn spawn_gateway_with(
    routes: Vec<RouteDefinition>,
    request_timeout: Duration,
    grace_period: Duration,
) -> TestGateway {
    let registry = RouteRegistry::load(routes).unwrap();
    let dispatcher = ProxyDispatcher::new(Arc::new(HttpClientAdapter::new().unwrap()), request_timeout);
    let handler = Arc::new(HttpHandler::new(
        registry,
        dispatcher,
        Arc::new(TracingEventSink),
    ));
    let app = handler.into_router(&CorsConfig::default());

    let server = Arc::new(GatewayServer::new(grace_period, Arc::new(TracingEventSink)));
    let state = server.subscribe();
    let listener = server.bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Arc::new(GracefulShutdown::new());
    let mut token = shutdown.shutdown_token();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, app, async move { token.wait_for_shutdown().await })
            .await
    });

    TestGateway {
        addr,
        shutdown,
        state,
        handle,
    }
}

/// Client that never reuses connections, so each request exercises a fresh accept.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
