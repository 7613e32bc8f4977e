//! Side channel through which the proxy core reports what happened.
//!
//! Emission must not block request handling materially; implementations are shared by every
//! request task and therefore must be safe for concurrent use.
use std::{error::Error, net::IpAddr};

use hyper::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A request matched a route and is about to be dispatched.
    RequestObserved,
    RouteNotFound,
    /// Dispatch failed with a gateway error (unreachable, timeout, bad response).
    ProxyError,
    /// Drain grace period ran out and in-flight connections were abandoned.
    ShutdownTimeout,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestObserved => "request_observed",
            Self::RouteNotFound => "route_not_found",
            Self::ProxyError => "proxy_error",
            Self::ShutdownTimeout => "shutdown_timeout",
        }
    }
}

/// One reported occurrence. `route` is empty when no route was resolved.
#[derive(Debug, Clone, Copy)]
pub struct GatewayEvent<'a> {
    pub kind: EventKind,
    pub route: &'a str,
    pub method: Option<&'a Method>,
    pub path: Option<&'a str>,
    /// Resolved client address, see `adapters::middleware::real_ip_middleware`.
    pub client_ip: Option<IpAddr>,
    /// Set only for [`EventKind::RequestObserved`].
    pub auth_required: Option<bool>,
    pub error: Option<&'a (dyn Error + 'static)>,
}

impl<'a> GatewayEvent<'a> {
    pub fn new(kind: EventKind, route: &'a str) -> Self {
        Self {
            kind,
            route,
            method: None,
            path: None,
            client_ip: None,
            auth_required: None,
            error: None,
        }
    }

    pub fn request(mut self, method: &'a Method, path: &'a str) -> Self {
        self.method = Some(method);
        self.path = Some(path);
        self
    }

    pub fn client_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = Some(required);
        self
    }

    pub fn error(mut self, error: &'a (dyn Error + 'static)) -> Self {
        self.error = Some(error);
        self
    }
}

/// Consumer of [`GatewayEvent`]s.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: &GatewayEvent<'_>);
}
