//! Ordered, immutable route table and the first-match path matcher.
use std::sync::Arc;

use crate::{
    config::{ConfigError, ConfigValidator, RouteDefinition},
    core::{backend::BackendUrl, error::GatewayError},
};

/// A validated route: the configured definition plus its pre-parsed backend URL.
#[derive(Debug, Clone)]
pub struct Route {
    definition: RouteDefinition,
    backend: BackendUrl,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn path_prefix(&self) -> &str {
        &self.definition.path_prefix
    }

    pub fn auth_required(&self) -> bool {
        self.definition.auth_required
    }

    pub fn strip_path_prefix(&self) -> bool {
        self.definition.strip_path_prefix
    }

    pub fn backend(&self) -> &BackendUrl {
        &self.backend
    }

    /// Literal string prefix comparison; `/api` matches `/api`, `/api/x` and also `/apix`.
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(self.path_prefix())
    }
}

/// The route table, built once at startup and shared read-only by every request task.
///
/// Matching walks the routes in registration order and returns the first hit. Overlapping
/// prefixes are not reordered by specificity: a broad prefix registered first shadows every
/// narrower prefix registered after it.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    routes: Arc<[Route]>,
}

impl RouteRegistry {
    /// Validate and freeze an ordered list of definitions. Any invalid entry fails the whole load.
    pub fn load(definitions: Vec<RouteDefinition>) -> Result<Self, ConfigError> {
        ConfigValidator::validate_routes(&definitions)?;

        let routes = definitions
            .into_iter()
            .map(|definition| {
                let backend = BackendUrl::new(&definition.backend_base_url).map_err(|e| {
                    ConfigError::InvalidBackendUrl {
                        route: definition.name.clone(),
                        url: definition.backend_base_url.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Route {
                    definition,
                    backend,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        tracing::debug!(routes = routes.len(), "Route registry loaded");
        Ok(Self {
            routes: routes.into(),
        })
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the first registered route whose prefix matches `path`.
    pub fn match_route(&self, path: &str) -> Result<&Route, GatewayError> {
        self.routes
            .iter()
            .find(|route| route.matches(path))
            .ok_or_else(|| GatewayError::NoRouteMatched {
                path: path.to_string(),
            })
    }
}
