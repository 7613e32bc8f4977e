//! Axum middleware and tower layers shared by the gateway router.
//!
//! Everything here is stateless apart from the configuration captured when the layer is built.
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};

use crate::{config::CorsConfig, core::director::X_FORWARDED_FOR};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const TRUE_CLIENT_IP: HeaderName = HeaderName::from_static("true-client-ip");

/// Client address of the request: the one reported by a fronting proxy, else the socket peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Ensure every request carries an `X-Request-ID`.
///
/// A caller-supplied id is kept; otherwise a UUID v4 is generated. The id is forwarded to the
/// backend with the request and echoed on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(&X_REQUEST_ID) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            let generated = uuid::Uuid::new_v4().to_string();
            match HeaderValue::from_str(&generated) {
                Ok(value) => {
                    req.headers_mut().insert(X_REQUEST_ID, value.clone());
                    value
                }
                Err(_) => return next.run(req).await,
            }
        }
    };

    let mut response = next.run(req).await;
    if !response.headers().contains_key(&X_REQUEST_ID) {
        response.headers_mut().insert(X_REQUEST_ID, request_id);
    }
    response
}

/// Resolve the [`ClientIp`] of every request and store it as a request extension.
pub async fn real_ip_middleware(mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    if let Some(ip) = forwarded_client_ip(req.headers()).or(peer) {
        req.extensions_mut().insert(ClientIp(ip));
    }
    next.run(req).await
}

/// Client IP reported by headers: `True-Client-IP`, then `X-Real-IP`, then the first
/// `X-Forwarded-For` entry. Values that do not parse as an IP address are ignored.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let single = |name: &HeaderName| -> Option<IpAddr> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    };
    single(&TRUE_CLIENT_IP)
        .or_else(|| single(&X_REAL_IP))
        .or_else(|| {
            headers
                .get(&X_FORWARDED_FOR)?
                .to_str()
                .ok()?
                .split(',')
                .next()?
                .trim()
                .parse()
                .ok()
        })
}

/// Build the CORS layer for `config`.
///
/// A `*` in origins, methods or headers mirrors the caller's request instead of sending a
/// literal wildcard, which browsers reject on credentialed requests. A `*` in exposed headers is
/// only honoured without credentials. Entries that are not valid header values are skipped with
/// a warning.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_origin = if has_wildcard(&config.allowed_origins) {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(parse_all(&config.allowed_origins, "origin", |o| {
            HeaderValue::from_str(o).ok()
        }))
    };

    let allow_methods = if has_wildcard(&config.allowed_methods) {
        AllowMethods::mirror_request()
    } else {
        AllowMethods::list(parse_all(&config.allowed_methods, "method", |m| {
            m.parse::<Method>().ok()
        }))
    };

    let allow_headers = if has_wildcard(&config.allowed_headers) {
        AllowHeaders::mirror_request()
    } else {
        AllowHeaders::list(parse_all(&config.allowed_headers, "header", |h| {
            h.parse::<HeaderName>().ok()
        }))
    };

    let expose_headers = if has_wildcard(&config.exposed_headers) && !config.allow_credentials {
        ExposeHeaders::any()
    } else {
        ExposeHeaders::list(parse_all(&config.exposed_headers, "exposed header", |h| {
            if h == "*" {
                None
            } else {
                h.parse::<HeaderName>().ok()
            }
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(allow_methods)
        .allow_headers(allow_headers)
        .expose_headers(expose_headers)
        .allow_credentials(config.allow_credentials)
        .max_age(Duration::from_secs(config.max_age_secs))
}

fn has_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v.trim() == "*")
}

fn parse_all<T>(values: &[String], what: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| {
            let parsed = parse(value.trim());
            if parsed.is_none() {
                tracing::warn!("Ignoring invalid CORS {}: {}", what, value);
            }
            parsed
        })
        .collect()
}

/// Response for a handler that panicked. The panic payload is logged, never returned.
pub fn panic_response(payload: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "Request handler panicked");

    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
