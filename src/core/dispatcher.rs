//! Sends rewritten requests to their backend under a single per-request deadline.
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use axum::body::Body;
use bytes::Bytes;
use hyper::{
    Response,
    body::{Body as HttpBody, Frame, SizeHint},
};
use thiserror::Error;
use tokio::time::{Instant, Sleep, sleep_until, timeout_at};

use crate::{
    core::{
        director::{ProxyRequest, strip_hop_by_hop_headers},
        error::GatewayError,
    },
    ports::http_client::HttpClient,
};

/// Default overall deadline for one proxied request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Stand-in deadline when `started + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Stateless dispatch of [`ProxyRequest`]s.
///
/// Exactly one attempt is made per request. Backend status codes, including 4xx and 5xx, are
/// passed through as they are; only failing to obtain a response becomes a [`GatewayError`].
#[derive(Clone)]
pub struct ProxyDispatcher {
    client: Arc<dyn HttpClient>,
    request_timeout: Duration,
}

impl ProxyDispatcher {
    pub fn new(client: Arc<dyn HttpClient>, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send `proxy` and stream the backend response back.
    ///
    /// The deadline runs from [`ProxyRequest::started`]. It bounds waiting for the response
    /// head (a miss is [`GatewayError::BackendTimeout`]) and keeps running while the body streams;
    /// a body still streaming when it passes is cut off with an error.
    pub async fn dispatch(&self, proxy: ProxyRequest<'_>) -> Result<Response<Body>, GatewayError> {
        let route = proxy.route().name();
        let deadline = proxy
            .started()
            .checked_add(self.request_timeout)
            .unwrap_or_else(|| proxy.started() + FAR_FUTURE);

        let response = match timeout_at(deadline, self.client.send_request(proxy.into_request()))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(GatewayError::from_client_error(route, e)),
            Err(_) => {
                return Err(GatewayError::BackendTimeout {
                    route: route.to_string(),
                    timeout: self.request_timeout,
                });
            }
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop_headers(&mut parts.headers);
        tracing::debug!(route, status = parts.status.as_u16(), "Backend responded");

        let body = DeadlineBody::new(body, deadline, self.request_timeout);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl std::fmt::Debug for ProxyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDispatcher")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
#[error("response body still streaming when the {0:?} request deadline passed")]
pub struct DeadlineExceeded(Duration);

/// Response body that fails once the request deadline passes.
struct DeadlineBody {
    inner: Body,
    sleep: Pin<Box<Sleep>>,
    timeout: Duration,
    expired: bool,
}

impl DeadlineBody {
    fn new(inner: Body, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            sleep: Box::pin(sleep_until(deadline)),
            timeout,
            expired: false,
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }
        if let Poll::Ready(frame) = Pin::new(&mut this.inner).poll_frame(cx) {
            return Poll::Ready(frame);
        }
        match this.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                this.expired = true;
                Poll::Ready(Some(Err(axum::Error::new(DeadlineExceeded(this.timeout)))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures_util::stream;
    use http_body_util::BodyExt;
    use hyper::{Request, StatusCode, header};

    use super::*;
    use crate::{
        config::RouteDefinition,
        core::{director::rewrite, error::GatewayErrorKind, registry::RouteRegistry},
        ports::http_client::{HttpClientError, HttpClientResult},
    };

    enum Behaviour {
        Respond(StatusCode),
        Refuse,
        Garbage,
        Hang,
        SlowBody,
    }

    struct FakeClient {
        behaviour: Behaviour,
        seen: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
            self.seen.lock().unwrap().push(req.uri().to_string());
            match self.behaviour {
                Behaviour::Respond(status) => Ok(Response::builder()
                    .status(status)
                    .header(header::CONNECTION, "keep-alive")
                    .header("x-backend", "yes")
                    .body(Body::from("backend body"))
                    .unwrap()),
                Behaviour::Refuse => Err(HttpClientError::ConnectionError(
                    "tcp connect error: Connection refused".to_string(),
                )),
                Behaviour::Garbage => Err(HttpClientError::InvalidResponse(
                    "invalid HTTP version parsed".to_string(),
                )),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Behaviour::SlowBody => {
                    let chunks = stream::unfold(0u8, |n| async move {
                        if n > 0 {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                        }
                        Some((Ok::<_, std::io::Error>(Bytes::from("chunk")), n + 1))
                    });
                    Ok(Response::new(Body::from_stream(chunks)))
                }
            }
        }
    }

    fn registry() -> RouteRegistry {
        RouteRegistry::load(vec![RouteDefinition::new(
            "user-service",
            "http://users:8081",
            "/api/v1",
        )])
        .unwrap()
    }

    async fn dispatch(
        client: Arc<FakeClient>,
        timeout: Duration,
    ) -> Result<Response<Body>, GatewayError> {
        let registry = registry();
        let route = registry.match_route("/api/v1/users").unwrap();
        let request = Request::builder()
            .uri("/api/v1/users")
            .body(Body::empty())
            .unwrap();
        let proxy = rewrite(route, request, None, Instant::now()).unwrap();
        ProxyDispatcher::new(client, timeout).dispatch(proxy).await
    }

    #[tokio::test]
    async fn test_backend_status_passes_through() {
        let client = FakeClient::new(Behaviour::Respond(StatusCode::SERVICE_UNAVAILABLE));
        let response = dispatch(client.clone(), DEFAULT_REQUEST_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-backend"], "yes");
        assert!(!response.headers().contains_key(header::CONNECTION));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "backend body");
        assert_eq!(
            client.seen.lock().unwrap().as_slice(),
            ["http://users:8081/api/v1/users"]
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let err = dispatch(FakeClient::new(Behaviour::Refuse), DEFAULT_REQUEST_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), GatewayErrorKind::BackendUnreachable);
        assert_eq!(err.route_name(), Some("user-service"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_bad_response() {
        let err = dispatch(FakeClient::new(Behaviour::Garbage), DEFAULT_REQUEST_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), GatewayErrorKind::BackendBadResponse);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_still_dispatches() {
        let response = dispatch(FakeClient::new(Behaviour::Respond(StatusCode::OK)), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "backend body");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_timeout() {
        let err = dispatch(FakeClient::new(Behaviour::Hang), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), GatewayErrorKind::BackendTimeout);
        assert_eq!(err.translate().1, "Service user-service timed out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_off_streaming_body() {
        let response = dispatch(FakeClient::new(Behaviour::SlowBody), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let err = response.into_body().collect().await.unwrap_err();
        assert!(err.to_string().contains("deadline"), "{err}");
    }
}
