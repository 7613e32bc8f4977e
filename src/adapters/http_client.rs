use std::{error::Error as StdError, time::Duration};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter using Hyper with Rustls.
///
/// * Reaches both `http://` and `https://` backends through one pooled client
/// * Forces the outbound request version to HTTP/1.1
/// * Streams request and response bodies without buffering
/// * Classifies transport failures into [`HttpClientError`] variants
///
/// The adapter makes exactly one attempt per request; deadlines are enforced by the caller.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build::<_, AxumBody>(https_connector);

        tracing::debug!("Created backend HTTP client");
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        let backend = match (req.uri().scheme_str(), req.uri().authority()) {
            (Some(scheme), Some(authority)) => format!("{scheme}://{authority}"),
            _ => {
                tracing::error!("Outgoing URI is not absolute: {}", req.uri());
                return Err(HttpClientError::InvalidRequest(format!(
                    "Outgoing URI is not absolute: {}",
                    req.uri()
                )));
            }
        };

        let span = tracing::debug_span!(
            "backend_request",
            backend.url = %backend,
            http.method = %req.method(),
            http.path = %req.uri().path(),
            http.status_code = tracing::field::Empty,
        );

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let outgoing_request = Request::from_parts(parts, body);

        async move {
            tracing::debug!("Outgoing request headers: {:?}", outgoing_request.headers());

            match self.client.request(outgoing_request).await {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());
                    Ok(response.map(AxumBody::new))
                }
                Err(e) => {
                    let error = classify_error(&e);
                    tracing::debug!(error = %error, "Backend request failed");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Map a hyper-util client error onto the port's taxonomy. Parse failures mean the backend
/// answered with something that is not HTTP; everything else means it could not be reached.
fn classify_error(error: &hyper_util::client::legacy::Error) -> HttpClientError {
    let detail = error_chain(error);
    if error.is_connect() {
        return HttpClientError::ConnectionError(detail);
    }

    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(hyper_error) = cause.downcast_ref::<hyper::Error>() {
            if hyper_error.is_parse() {
                return HttpClientError::InvalidResponse(detail);
            }
        }
        source = cause.source();
    }

    HttpClientError::ConnectionError(detail)
}

fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
