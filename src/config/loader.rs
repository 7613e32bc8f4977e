use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix for structured environment overrides, e.g. `GATEWAY_REQUEST_TIMEOUT_SECS=30` or
/// `GATEWAY_LOGGING__FORMAT=pretty`.
pub const ENV_PREFIX: &str = "GATEWAY";

/// Annotated TOML configuration written by `pollpulse-gateway init`. Equivalent to the defaults.
pub const SAMPLE_CONFIG: &str = r#"# PollPulse API Gateway configuration
#
# Environment overrides: GATEWAY_<FIELD> (nested with "__", e.g. GATEWAY_LOGGING__FORMAT=pretty),
# plus PORT, LOG_LEVEL, ENV and <ROUTE_NAME>_URL (e.g. USER_SERVICE_URL).

listen_addr = "0.0.0.0:8080"
request_timeout_secs = 60
shutdown_grace_period_secs = 5

[logging]
level = "info"
format = "json"            # or "pretty"
service_name = "api-gateway"
environment = "development"

[cors]
enabled = true
allowed_origins = ["*"]
allowed_methods = ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
allowed_headers = ["Accept", "Authorization", "Content-Type", "X-CSRF-Token"]
exposed_headers = ["Link"]
allow_credentials = true
max_age_secs = 300

# Routes are matched in the order listed: the first prefix that matches wins.
# Put narrow prefixes before broad ones.
[[routes]]
name = "survey-service"
backend_base_url = "http://localhost:8082"
path_prefix = "/api/v1/surveys"
auth_required = true

[[routes]]
name = "result-service"
backend_base_url = "http://localhost:8083"
path_prefix = "/api/v1/results"
auth_required = true

[[routes]]
name = "user-service"
backend_base_url = "http://localhost:8081"
path_prefix = "/api/v1"
"#;

/// Load configuration from an optional file layered under `GATEWAY_*` environment variables,
/// then apply the legacy deployment variables (`PORT`, `LOG_LEVEL`, `ENV`, `<ROUTE>_URL`).
///
/// Supports multiple formats: YAML, JSON, TOML, INI (chosen by file extension).
pub async fn load_config(config_path: Option<&str>) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: Option<&str>) -> Result<GatewayConfig> {
    let mut config = load_layered(config_path, true)?;
    apply_legacy_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load a single file without consulting the environment, so tests are not affected by
/// `GATEWAY_*` variables of the host.
#[cfg(test)]
fn load_config_unchecked(config_path: &str) -> Result<GatewayConfig> {
    load_layered(Some(config_path), false)
}

fn load_layered(config_path: Option<&str>, with_env: bool) -> Result<GatewayConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);

        // Determine file format based on extension
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            Some("toml") => FileFormat::Toml,
            Some("ini") => FileFormat::Ini,
            _ => FileFormat::Yaml,
        };

        builder = builder.add_source(File::new(config_path, format).required(true));
    }

    if with_env {
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
    }

    let source = config_path.unwrap_or("<defaults>");
    let settings = builder
        .build()
        .with_context(|| format!("Failed to build config from {source}"))?;

    settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {source}"))
}

/// Apply the environment variables the original deployment used. `lookup` abstracts the
/// process environment so the mapping can be exercised without mutating global state.
pub fn apply_legacy_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(port) = non_empty("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.port = Some(port),
            Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid PORT"),
        }
    }

    if let Some(level) = non_empty("LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(environment) = non_empty("ENV") {
        config.logging.environment = environment;
    }

    for route in &mut config.routes {
        if let Some(url) = non_empty(&route.url_env_var()) {
            tracing::debug!(route = %route.name, url = %url, "Backend URL overridden from environment");
            route.backend_base_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
request_timeout_secs: 15
routes:
  - name: "survey-service"
    backend_base_url: "http://surveys:8082"
    path_prefix: "/api/v1/surveys"
    auth_required: true
  - name: "user-service"
    url: "http://users:8081"
    path_prefix: "/api/v1"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config_unchecked(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.shutdown_grace_period_secs, 5);
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[0].name, "survey-service");
        assert!(config.routes[0].auth_required);
        assert_eq!(config.routes[1].backend_base_url, "http://users:8081");
        assert!(!config.routes[1].strip_path_prefix);
    }

    #[tokio::test]
    async fn test_load_toml_config_preserves_route_order() {
        let toml_content = r#"
listen_addr = "127.0.0.1:3000"

[[routes]]
name = "broad"
backend_base_url = "http://a:1"
path_prefix = "/api"

[[routes]]
name = "narrow"
backend_base_url = "http://b:2"
path_prefix = "/api/v1"
strip_path_prefix = true

[logging]
format = "pretty"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config_unchecked(temp_file.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = config.routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["broad", "narrow"]);
        assert!(config.routes[1].strip_path_prefix);
        assert_eq!(
            config.logging.format,
            crate::config::models::LogFormat::Pretty
        );
    }

    #[tokio::test]
    async fn test_load_json_config_uses_defaults_for_missing_sections() {
        let json_content = r#"{ "listen_addr": "127.0.0.1:3000" }"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config_unchecked(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.routes, crate::config::models::default_routes());
        assert!(config.cors.enabled);
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", SAMPLE_CONFIG).unwrap();

        let config = load_config_unchecked(temp_file.path().to_str().unwrap()).unwrap();
        let defaults = GatewayConfig::default();
        assert_eq!(config.routes, defaults.routes);
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.request_timeout_secs, defaults.request_timeout_secs);
        assert_eq!(config.cors.allowed_headers, defaults.cors.allowed_headers);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config_unchecked("/definitely/not/here.yaml").is_err());
    }

    #[test]
    fn test_legacy_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("USER_SERVICE_URL", "http://users.internal:80"),
            ("LOG_LEVEL", "debug"),
            ("ENV", "production"),
            ("RESULT_SERVICE_URL", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        apply_legacy_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, Some(9000));
        assert_eq!(config.effective_listen_addr(), "0.0.0.0:9000");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.environment, "production");

        let url_of = |name: &str| {
            config
                .routes
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.backend_base_url.clone())
                .unwrap()
        };
        assert_eq!(url_of("user-service"), "http://users.internal:80");
        // Blank values fall back to the configured URL.
        assert_eq!(url_of("result-service"), "http://localhost:8083");
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let mut config = GatewayConfig::default();
        apply_legacy_env_overrides(&mut config, |key| {
            (key == "PORT").then(|| "eighty".to_string())
        });
        assert_eq!(config.port, None);
    }
}
