use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Build the level filter: `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

/// Initialize the global subscriber: JSON lines for production, pretty console output for
/// development.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = env_filter(&config.level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init(),
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        "Structured logging initialized"
    );
    Ok(())
}

/// Span wrapping the whole process so every line carries the service name and environment.
pub fn create_service_span(config: &LoggingConfig) -> tracing::Span {
    tracing::info_span!(
        "gateway",
        service = %config.service_name,
        env = %config.environment,
    )
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_rejects_garbage_level() {
        // RUST_LOG takes precedence when set, so only assert when it is absent.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("info,hyper=warn").is_ok());
            assert!(env_filter("pollpulse_gateway=loudest").is_err());
        }
    }

    #[test]
    fn test_init_tracing_twice_is_an_error_not_a_panic() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_create_request_span() {
        let span = create_request_span("GET", "/api/test", "req-123");
        assert_eq!(span.metadata().map(|m| m.name()), Some("request"));
    }

    #[test]
    fn test_create_service_span() {
        let span = create_service_span(&LoggingConfig::default());
        assert_eq!(span.metadata().map(|m| m.name()), Some("gateway"));
    }
}
