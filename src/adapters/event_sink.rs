use tracing::field::display;

use crate::ports::event_sink::{EventKind, EventSink, GatewayEvent};

/// [`EventSink`] backed by the global `tracing` subscriber.
///
/// Observed requests are logged at `info`, unmatched routes at `warn`, proxy failures and
/// drain timeouts at `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &GatewayEvent<'_>) {
        let method = event.method.map(|m| m.as_str());
        let client = event.client_ip.map(display);
        let error = event.error.map(display);

        match event.kind {
            EventKind::RequestObserved => tracing::info!(
                event = event.kind.as_str(),
                route = event.route,
                http.method = method,
                http.path = event.path,
                client.ip = client,
                auth_required = event.auth_required,
                "Proxying request"
            ),
            EventKind::RouteNotFound => tracing::warn!(
                event = event.kind.as_str(),
                http.method = method,
                http.path = event.path,
                client.ip = client,
                "No route matched"
            ),
            EventKind::ProxyError => tracing::error!(
                event = event.kind.as_str(),
                route = event.route,
                http.method = method,
                http.path = event.path,
                client.ip = client,
                error = error,
                "Proxy error"
            ),
            EventKind::ShutdownTimeout => tracing::error!(
                event = event.kind.as_str(),
                error = error,
                "Shutdown grace period exceeded, abandoning in-flight connections"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use hyper::Method;

    use super::*;
    use crate::{core::error::GatewayError, ports::http_client::HttpClientError};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_request_observed_is_logged_with_route() {
        let method = Method::GET;
        let output = capture(|| {
            TracingEventSink.emit(
                &GatewayEvent::new(EventKind::RequestObserved, "survey-service")
                    .request(&method, "/api/v1/surveys/1")
                    .auth_required(true),
            );
        });

        assert!(output.contains("\"level\":\"INFO\""), "{output}");
        assert!(output.contains("survey-service"));
        assert!(output.contains("/api/v1/surveys/1"));
        assert!(output.contains("\"auth_required\":true"));
    }

    #[test]
    fn test_proxy_error_carries_cause() {
        let error = GatewayError::from_client_error(
            "user-service",
            HttpClientError::ConnectionError("Connection refused".to_string()),
        );
        let method = Method::POST;
        let output = capture(|| {
            TracingEventSink.emit(
                &GatewayEvent::new(EventKind::ProxyError, "user-service")
                    .request(&method, "/api/v1/users")
                    .error(&error),
            );
        });

        assert!(output.contains("\"level\":\"ERROR\""), "{output}");
        assert!(output.contains("Connection refused"));
        assert!(output.contains("proxy_error"));
    }
}
