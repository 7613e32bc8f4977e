use std::{net::IpAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::time::Instant;
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    adapters::middleware::{
        ClientIp, X_REQUEST_ID, cors_layer, panic_response, real_ip_middleware,
        request_id_middleware,
    },
    config::CorsConfig,
    core::{GatewayError, ProxyDispatcher, RouteRegistry, director},
    ports::event_sink::{EventKind, EventSink, GatewayEvent},
    tracing_setup,
};

pub const GATEWAY_NAME: &str = "PollPulse API Gateway";

/// HTTP entry point: fixed endpoints plus the proxy fallback.
///
/// The handler holds only shared read-only state, so one instance serves every connection.
pub struct HttpHandler {
    registry: RouteRegistry,
    dispatcher: ProxyDispatcher,
    events: Arc<dyn EventSink>,
}

impl HttpHandler {
    pub fn new(
        registry: RouteRegistry,
        dispatcher: ProxyDispatcher,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            events,
        }
    }

    /// Match, rewrite and dispatch one request. Always yields a response; gateway failures are
    /// translated and reported to the event sink.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_ip: Option<IpAddr>,
    ) -> Response<AxumBody> {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let route = match self.registry.match_route(&path) {
            Ok(route) => route,
            Err(e) => {
                self.events.emit(
                    &GatewayEvent::new(EventKind::RouteNotFound, "")
                        .request(&method, &path)
                        .client_ip(client_ip),
                );
                return e.into_response();
            }
        };

        self.events.emit(
            &GatewayEvent::new(EventKind::RequestObserved, route.name())
                .request(&method, &path)
                .client_ip(client_ip)
                .auth_required(route.auth_required()),
        );

        let result = match director::rewrite(route, req, client_ip, started) {
            Ok(proxy) => self.dispatcher.dispatch(proxy).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => response,
            Err(e) => self.proxy_error(e, &method, &path, client_ip),
        }
    }

    fn proxy_error(
        &self,
        error: GatewayError,
        method: &hyper::Method,
        path: &str,
        client_ip: Option<IpAddr>,
    ) -> Response<AxumBody> {
        self.events.emit(
            &GatewayEvent::new(EventKind::ProxyError, error.route_name().unwrap_or_default())
                .request(method, path)
                .client_ip(client_ip)
                .error(&error),
        );
        error.into_response()
    }

    /// Build the axum router serving this handler.
    ///
    /// `GET /health` and `GET /` are answered locally (other methods on those paths get 405);
    /// every other path goes through the proxy. The client address is the [`ClientIp`] resolved
    /// by [`real_ip_middleware`].
    pub fn into_router(self: Arc<Self>, cors: &CorsConfig) -> Router {
        let handler = self;
        let proxy = move |req: Request| {
            let handler = handler.clone();
            async move {
                let client_ip = req.extensions().get::<ClientIp>().map(|ClientIp(ip)| *ip);
                handler.handle_request(req, client_ip).await
            }
        };

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/", get(gateway_info))
            .fallback(proxy)
            .layer(CatchPanicLayer::custom(panic_response));

        if cors.enabled {
            router = router.layer(cors_layer(cors));
        }

        router
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request<AxumBody>| {
                        let request_id = req
                            .headers()
                            .get(&X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default();
                        tracing_setup::create_request_span(
                            req.method().as_str(),
                            req.uri().path(),
                            request_id,
                        )
                    })
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(middleware::from_fn(real_ip_middleware))
            .layer(middleware::from_fn(request_id_middleware))
    }
}

/// Liveness only: independent of backend health.
async fn health() -> &'static str {
    "OK"
}

async fn gateway_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": GATEWAY_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}
