//! Request rewriting: turns an inbound request into the request sent to a route's backend.
//!
//! [`rewrite`] is a pure function of the matched route and the inbound request. Nothing here
//! holds per-route state, so a single registry can serve every request concurrently.
use std::net::IpAddr;

use axum::body::Body;
use hyper::{
    HeaderMap, Method, Request, Uri,
    header::{self, HeaderName, HeaderValue},
    http::uri::PathAndQuery,
};
use tokio::time::Instant;

use crate::{
    core::{error::GatewayError, registry::Route},
    ports::http_client::HttpClientError,
};

/// Identifies traffic that passed through this gateway.
pub const GATEWAY_HEADER: HeaderName = HeaderName::from_static("x-gateway");
pub const GATEWAY_HEADER_VALUE: HeaderValue = HeaderValue::from_static("PollPulse-API-Gateway");

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single transport hop and must not be forwarded.
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Route information attached to the outbound request as an extension.
///
/// `auth_required` is informational: the gateway forwards it to whatever sits downstream
/// (logging, an auth middleware) and never enforces it itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteContext {
    pub route: String,
    pub auth_required: bool,
}

/// A matched request rewritten for its backend. Lives until the response is written or the
/// request fails.
#[derive(Debug)]
pub struct ProxyRequest<'r> {
    route: &'r Route,
    method: Method,
    original_path: String,
    started: Instant,
    request: Request<Body>,
}

impl<'r> ProxyRequest<'r> {
    pub fn route(&self) -> &'r Route {
        self.route
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path as received from the caller, before stripping and base-path joining.
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    /// Origin of the per-request deadline.
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn into_request(self) -> Request<Body> {
        self.request
    }
}

/// Rewrite `inbound` so that it targets `route`'s backend.
///
/// Scheme and authority come from the backend URL and `Host` is set to match. The prefix is
/// removed when the route asks for it, and the result always starts with `/`. `X-Gateway` is
/// appended next to any value the caller sent. Hop-by-hop headers are dropped and the caller's
/// address is appended to `X-Forwarded-For`. Every other header and the body pass through
/// untouched.
pub fn rewrite<'r>(
    route: &'r Route,
    inbound: Request<Body>,
    client_ip: Option<IpAddr>,
    started: Instant,
) -> Result<ProxyRequest<'r>, GatewayError> {
    let (mut parts, body) = inbound.into_parts();
    let original_path = parts.uri.path().to_string();

    parts.uri = backend_uri(route, &parts.uri)?;

    let headers = &mut parts.headers;
    strip_hop_by_hop_headers(headers);
    headers.insert(
        header::HOST,
        HeaderValue::from_str(route.backend().authority().as_str())
            .map_err(|e| invalid_request(route, e))?,
    );
    headers.append(GATEWAY_HEADER, GATEWAY_HEADER_VALUE);
    if let Some(ip) = client_ip {
        append_forwarded_for(headers, ip);
    }

    parts.extensions.insert(RouteContext {
        route: route.name().to_string(),
        auth_required: route.auth_required(),
    });

    Ok(ProxyRequest {
        route,
        method: parts.method.clone(),
        original_path,
        started,
        request: Request::from_parts(parts, body),
    })
}

/// The path sent to the backend, before the backend's base path is joined on.
pub fn forwarded_path<'p>(route: &Route, path: &'p str) -> std::borrow::Cow<'p, str> {
    if !route.strip_path_prefix() {
        return path.into();
    }
    let rest = path.strip_prefix(route.path_prefix()).unwrap_or(path);
    if rest.starts_with('/') {
        rest.into()
    } else {
        format!("/{rest}").into()
    }
}

fn backend_uri(route: &Route, inbound: &Uri) -> Result<Uri, GatewayError> {
    let backend = route.backend();
    let path = backend.join_path(&forwarded_path(route, inbound.path()));
    let path_and_query = match backend.join_query(inbound.query()) {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    let path_and_query =
        PathAndQuery::try_from(path_and_query).map_err(|e| invalid_request(route, e))?;

    Uri::builder()
        .scheme(backend.scheme().clone())
        .authority(backend.authority().clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| invalid_request(route, e))
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    let value = if prior.is_empty() {
        ip.to_string()
    } else {
        format!("{}, {ip}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

fn invalid_request(route: &Route, error: impl std::fmt::Display) -> GatewayError {
    GatewayError::from_client_error(
        route.name(),
        HttpClientError::InvalidRequest(error.to_string()),
    )
}
