//! Gateway-level failures and their translation into HTTP responses.
//!
//! A `GatewayError` is distinct from a backend's own 4xx/5xx: it means the gateway could not
//! route the request or could not obtain a valid response. The underlying transport cause is kept
//! for the event sink and never rendered into the response body.
use std::time::Duration;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::ports::http_client::HttpClientError;

/// Discriminant of a [`GatewayError`], convenient for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    NoRouteMatched,
    BackendUnreachable,
    BackendTimeout,
    BackendBadResponse,
}

impl GatewayErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoRouteMatched => "no_route_matched",
            Self::BackendUnreachable => "backend_unreachable",
            Self::BackendTimeout => "backend_timeout",
            Self::BackendBadResponse => "backend_bad_response",
        }
    }
}

/// A classified failure to proxy a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("No route matches path {path}")]
    NoRouteMatched { path: String },

    #[error("Backend for route {route} is unreachable: {source}")]
    BackendUnreachable {
        route: String,
        #[source]
        source: HttpClientError,
    },

    #[error("Backend for route {route} did not respond within {timeout:?}")]
    BackendTimeout { route: String, timeout: Duration },

    #[error("Backend for route {route} returned an invalid response: {source}")]
    BackendBadResponse {
        route: String,
        #[source]
        source: HttpClientError,
    },
}

impl GatewayError {
    /// Classify a transport failure reported by the HTTP client port.
    pub fn from_client_error(route: &str, error: HttpClientError) -> Self {
        let route = route.to_string();
        match error {
            HttpClientError::InvalidResponse(_) => Self::BackendBadResponse {
                route,
                source: error,
            },
            _ => Self::BackendUnreachable {
                route,
                source: error,
            },
        }
    }

    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            Self::NoRouteMatched { .. } => GatewayErrorKind::NoRouteMatched,
            Self::BackendUnreachable { .. } => GatewayErrorKind::BackendUnreachable,
            Self::BackendTimeout { .. } => GatewayErrorKind::BackendTimeout,
            Self::BackendBadResponse { .. } => GatewayErrorKind::BackendBadResponse,
        }
    }

    /// Name of the resolved route, if matching got that far.
    pub fn route_name(&self) -> Option<&str> {
        match self {
            Self::NoRouteMatched { .. } => None,
            Self::BackendUnreachable { route, .. }
            | Self::BackendTimeout { route, .. }
            | Self::BackendBadResponse { route, .. } => Some(route),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            GatewayErrorKind::NoRouteMatched => StatusCode::NOT_FOUND,
            GatewayErrorKind::BackendUnreachable | GatewayErrorKind::BackendBadResponse => {
                StatusCode::BAD_GATEWAY
            }
            GatewayErrorKind::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Map the error to the status and body shown to the caller.
    pub fn translate(&self) -> (StatusCode, String) {
        let body = match self {
            Self::NoRouteMatched { .. } => "Not Found".to_string(),
            Self::BackendUnreachable { route, .. } => format!("Service {route} is unavailable"),
            Self::BackendTimeout { route, .. } => format!("Service {route} timed out"),
            Self::BackendBadResponse { route, .. } => {
                format!("Service {route} returned an invalid response")
            }
        };
        (self.status_code(), body)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = self.translate();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_matches_error_table() {
        let cases = [
            (
                GatewayError::NoRouteMatched {
                    path: "/nope".to_string(),
                },
                StatusCode::NOT_FOUND,
                "Not Found",
            ),
            (
                GatewayError::BackendUnreachable {
                    route: "user-service".to_string(),
                    source: HttpClientError::ConnectionError("refused".to_string()),
                },
                StatusCode::BAD_GATEWAY,
                "Service user-service is unavailable",
            ),
            (
                GatewayError::BackendTimeout {
                    route: "survey-service".to_string(),
                    timeout: Duration::from_secs(60),
                },
                StatusCode::GATEWAY_TIMEOUT,
                "Service survey-service timed out",
            ),
            (
                GatewayError::BackendBadResponse {
                    route: "result-service".to_string(),
                    source: HttpClientError::InvalidResponse("garbage".to_string()),
                },
                StatusCode::BAD_GATEWAY,
                "Service result-service returned an invalid response",
            ),
        ];

        for (error, status, body) in cases {
            assert_eq!(error.translate(), (status, body.to_string()));
        }
    }

    #[test]
    fn translate_never_leaks_transport_detail() {
        let error = GatewayError::from_client_error(
            "user-service",
            HttpClientError::ConnectionError("tcp connect error: 10.0.0.7:8081".to_string()),
        );
        let (_, body) = error.translate();
        assert!(!body.contains("10.0.0.7"));
        // The cause is still available to logging.
        assert!(error.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn client_errors_are_classified() {
        let unreachable = GatewayError::from_client_error(
            "a",
            HttpClientError::ConnectionError("refused".to_string()),
        );
        assert_eq!(unreachable.kind(), GatewayErrorKind::BackendUnreachable);
        assert_eq!(unreachable.route_name(), Some("a"));

        let bad = GatewayError::from_client_error(
            "a",
            HttpClientError::InvalidResponse("parse".to_string()),
        );
        assert_eq!(bad.kind(), GatewayErrorKind::BackendBadResponse);
    }

    #[test]
    fn into_response_uses_translation() {
        let response = GatewayError::NoRouteMatched {
            path: "/x".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
