use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Transport-level failures reported by an [`HttpClient`].
///
/// A backend that answers with a 4xx/5xx status is *not* an error here; its response is
/// returned as-is.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// The backend could not be reached (refused, reset, DNS, TLS handshake).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The outbound request could not be sent as built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backend answered with something that is not a valid HTTP response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to backends
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an absolute-URI request to a backend and return once the response head arrives.
    ///
    /// The response body is streamed; it is not collected by the client.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
