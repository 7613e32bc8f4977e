//! Configuration data structures for the gateway.
//!
//! These types map directly to YAML / JSON / TOML configuration files. Every field carries a
//! default so the gateway starts without any file at all, reproducing the stock PollPulse
//! deployment (three backends on localhost).
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_shutdown_grace_period_secs() -> u64 {
    5
}

/// A single backend service mapping: every inbound path starting with `path_prefix` is proxied
/// to `backend_base_url`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    /// Unique identifier, used in logs and gateway error bodies.
    pub name: String,
    /// Absolute `http`/`https` URL of the backend (scheme, host, optional port and base path).
    #[serde(alias = "url")]
    pub backend_base_url: String,
    /// Literal path prefix; no wildcard or regex semantics.
    pub path_prefix: String,
    /// Informational only. Forwarded as request context, never enforced by the gateway.
    #[serde(default)]
    pub auth_required: bool,
    /// Remove `path_prefix` from the path sent to the backend.
    #[serde(default)]
    pub strip_path_prefix: bool,
}

impl RouteDefinition {
    pub fn new(
        name: impl Into<String>,
        backend_base_url: impl Into<String>,
        path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backend_base_url: backend_base_url.into(),
            path_prefix: path_prefix.into(),
            auth_required: false,
            strip_path_prefix: false,
        }
    }

    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    pub fn strip_path_prefix(mut self, strip: bool) -> Self {
        self.strip_path_prefix = strip;
        self
    }

    /// Name of the legacy environment variable overriding this route's backend URL,
    /// e.g. `user-service` -> `USER_SERVICE_URL`.
    pub fn url_env_var(&self) -> String {
        let mut key: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        key.push_str("_URL");
        key
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Structured logging configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set (e.g. `info`, `debug,hyper=warn`).
    pub level: String,
    pub format: LogFormat,
    /// Attached to every log line as the `service` field.
    pub service_name: String,
    /// Attached to every log line as the `env` field.
    pub environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            service_name: "api-gateway".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Cross-origin resource sharing policy applied to every response.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// `*` reflects the caller's origin, which keeps credentialed requests working.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: ["Accept", "Authorization", "Content-Type", "X-CSRF-Token"]
                .into_iter()
                .map(String::from)
                .collect(),
            exposed_headers: vec!["Link".to_string()],
            allow_credentials: true,
            max_age_secs: 300,
        }
    }
}

/// Top level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Overrides the port part of `listen_addr` when set.
    #[serde(default)]
    pub port: Option<u16>,
    /// Overall per-request deadline, measured from request start.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long in-flight requests may run once shutdown has been signalled.
    #[serde(default = "default_shutdown_grace_period_secs")]
    pub shutdown_grace_period_secs: u64,
    /// Ordered route list. Earlier entries win when prefixes overlap.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteDefinition>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    /// The address to bind, with `port` (if any) replacing the port of `listen_addr`.
    pub fn effective_listen_addr(&self) -> String {
        match self.port {
            Some(port) => match self.listen_addr.rsplit_once(':') {
                Some((host, _)) => format!("{host}:{port}"),
                None => format!("{}:{port}", self.listen_addr),
            },
            None => self.listen_addr.clone(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: None,
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_grace_period_secs: default_shutdown_grace_period_secs(),
            routes: default_routes(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// The stock PollPulse backends. Narrow prefixes come first because matching is
/// first-registered-wins.
pub fn default_routes() -> Vec<RouteDefinition> {
    vec![
        RouteDefinition::new("survey-service", "http://localhost:8082", "/api/v1/surveys")
            .auth_required(true),
        RouteDefinition::new("result-service", "http://localhost:8083", "/api/v1/results")
            .auth_required(true),
        RouteDefinition::new("user-service", "http://localhost:8081", "/api/v1"),
    ]
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    request_timeout: Option<Duration>,
    shutdown_grace_period: Option<Duration>,
    routes: Vec<RouteDefinition>,
    logging: Option<LoggingConfig>,
    cors: Option<CorsConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = Some(grace);
        self
    }

    /// Append a route; registration order is matching order.
    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }

        Ok(GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            port: None,
            request_timeout_secs: self
                .request_timeout
                .map_or_else(default_request_timeout_secs, |d| d.as_secs()),
            shutdown_grace_period_secs: self
                .shutdown_grace_period
                .map_or_else(default_shutdown_grace_period_secs, |d| d.as_secs()),
            routes: self.routes,
            logging: self.logging.unwrap_or_default(),
            cors: self.cors.unwrap_or_default(),
        })
    }
}
