//! PollPulse gateway - a path-routing API gateway and reverse proxy.
//!
//! The gateway fronts the PollPulse backend services (users, surveys, results) behind a single
//! HTTP entry point. Each inbound request is matched against an ordered list of path prefixes,
//! rewritten for the chosen backend and proxied with its body streamed in both directions.
//!
//! # Features
//! - Literal prefix routing with first-registered-wins precedence
//! - Optional prefix stripping and backend base paths
//! - One overall deadline per request covering the response head and body
//! - Uniform 404 / 502 / 504 gateway errors that never leak transport details
//! - Graceful shutdown with a bounded drain period
//! - Layered configuration (file + `GATEWAY_*` environment) and structured `tracing` logs
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use pollpulse_gateway::{
//!     GatewayServer, HttpClientAdapter, HttpHandler, ProxyDispatcher, RouteRegistry,
//!     TracingEventSink, config::GatewayConfig, utils::ShutdownReason,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = GatewayConfig::default();
//! let registry = RouteRegistry::load(config.routes.clone())?;
//! let dispatcher = ProxyDispatcher::new(
//!     Arc::new(HttpClientAdapter::new()?),
//!     config.request_timeout(),
//! );
//! let handler = Arc::new(HttpHandler::new(registry, dispatcher, Arc::new(TracingEventSink)));
//!
//! let server = GatewayServer::new(config.shutdown_grace_period(), Arc::new(TracingEventSink));
//! server
//!     .run(
//!         &config.effective_listen_addr(),
//!         handler.into_router(&config.cors),
//!         async { ShutdownReason::Requested },
//!     )
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate follows a hexagonal layout. `core` holds the routing and proxy logic and depends
//! only on the traits in `ports` (backend HTTP client, event sink). `adapters` provide the
//! hyper/axum implementations and the server lifecycle; `config` and `tracing_setup` are the
//! ambient layers used by the binary.
//!
//! # Error Handling
//! Library errors are typed with `thiserror` (`GatewayError`, `ConfigError`, `LifecycleError`,
//! ...). Application-level code uses `eyre::Result` with `WrapErr` context.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{GatewayServer, HttpClientAdapter, HttpHandler, TracingEventSink},
    core::{
        DrainOutcome, GatewayError, LifecycleState, ProxyDispatcher, Route, RouteRegistry,
    },
    ports::{event_sink::EventSink, http_client::HttpClient},
    utils::GracefulShutdown,
};
