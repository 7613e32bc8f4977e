use std::{collections::HashSet, net::SocketAddr};

use crate::config::models::{CorsConfig, GatewayConfig, RouteDefinition};

/// Upper bound for the request timeout and the shutdown grace period.
pub const MAX_DURATION_SECS: u64 = 86_400;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ConfigError>;

/// Configuration errors. Every variant is fatal at startup.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid backend URL '{url}' for route '{route}': {reason}")]
    InvalidBackendUrl {
        route: String,
        url: String,
        reason: String,
    },

    #[error("Duplicate route name '{name}'")]
    DuplicateRouteName { name: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire gateway configuration, collecting every problem into one report.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.effective_listen_addr()) {
            errors.push(e);
        }

        for (field, secs) in [
            ("request_timeout_secs", config.request_timeout_secs),
            ("shutdown_grace_period_secs", config.shutdown_grace_period_secs),
        ] {
            if let Err(e) = Self::validate_duration_secs(field, secs) {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_cors(&config.cors));

        if let Err(mut route_errors) = Self::collect_route_errors(&config.routes) {
            errors.append(&mut route_errors);
        }

        Self::into_result(errors)
    }

    /// Validate an ordered route list on its own (used by the route registry).
    pub fn validate_routes(routes: &[RouteDefinition]) -> ValidationResult<()> {
        match Self::collect_route_errors(routes) {
            Ok(()) => Ok(()),
            Err(errors) => Self::into_result(errors),
        }
    }

    fn collect_route_errors(routes: &[RouteDefinition]) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if routes.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "routes".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for route in routes {
            if let Err(mut route_errors) = Self::validate_single_route(route) {
                errors.append(&mut route_errors);
            }
            if !route.name.is_empty() && !seen.insert(route.name.as_str()) {
                errors.push(ConfigError::DuplicateRouteName {
                    name: route.name.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_duration_secs(field: &str, secs: u64) -> ValidationResult<()> {
        let message = if secs == 0 {
            "Must be greater than 0".to_string()
        } else if secs > MAX_DURATION_SECS {
            format!("Must be at most {MAX_DURATION_SECS} seconds")
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidField {
            field: field.to_string(),
            message,
        })
    }

    /// Browsers reject a literal `*` on credentialed responses, so wildcard methods and
    /// headers are mirrored from the request instead. A wildcard in `exposed_headers` cannot be
    /// mirrored and is refused when credentials are allowed.
    fn validate_cors(cors: &CorsConfig) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !cors.enabled {
            return errors;
        }
        if cors.allow_credentials && cors.exposed_headers.iter().any(|h| h.trim() == "*") {
            errors.push(ConfigError::InvalidField {
                field: "cors.exposed_headers".to_string(),
                message: "'*' cannot be combined with allow_credentials = true".to_string(),
            });
        }
        errors
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single route definition
    fn validate_single_route(route: &RouteDefinition) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if route.name.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("route with prefix '{}' name", route.path_prefix),
                message: "Route name cannot be empty".to_string(),
            });
        }

        if !route.path_prefix.starts_with('/') {
            errors.push(ConfigError::InvalidField {
                field: format!("route '{}' path_prefix", route.name),
                message: format!(
                    "Path prefix must start with '/', got '{}'",
                    route.path_prefix
                ),
            });
        }

        if let Err(e) = Self::validate_url(&route.name, &route.backend_base_url) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(route: &str, url_str: &str) -> ValidationResult<()> {
        let invalid = |reason: String| ConfigError::InvalidBackendUrl {
            route: route.to_string(),
            url: url_str.to_string(),
            reason,
        };

        let url = url::Url::parse(url_str).map_err(|e| invalid(format!("Invalid URL format: {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!(
                "URL scheme must be 'http' or 'https', got '{}'",
                url.scheme()
            )));
        }

        if url.host().is_none() {
            return Err(invalid("URL must have a valid host".to_string()));
        }

        Ok(())
    }

    fn into_result(mut errors: Vec<ConfigError>) -> ValidationResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::ValidationFailed {
                message: Self::format_multiple_errors(&errors),
            }),
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: &[ConfigError]) -> String {
        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
