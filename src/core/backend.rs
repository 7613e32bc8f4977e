use std::{fmt, str::FromStr};

use hyper::http::uri::{Authority, Scheme};
use thiserror::Error;

/// Errors related to backend operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    /// Error when URL is invalid
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A parsed, validated backend base URL.
///
/// Parsing happens once at registry load; the request path only reads the pre-split
/// scheme, authority, base path and base query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl {
    url: String,
    scheme: Scheme,
    authority: Authority,
    /// Path component of the base URL without a trailing slash ("" when the URL has no path).
    base_path: String,
    base_query: Option<String>,
}

impl BackendUrl {
    /// Creates a new BackendUrl if the provided string is an absolute http(s) URL with a host.
    pub fn new(url: &str) -> BackendResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| BackendError::InvalidUrl(format!("{url}: {e}")))?;

        let scheme = match parsed.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => {
                return Err(BackendError::InvalidUrl(format!(
                    "Backend URL must use http or https, got '{other}' in {url}"
                )));
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| BackendError::InvalidUrl(format!("Backend URL has no host: {url}")))?;
        let authority_str = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority_str)
            .map_err(|e| BackendError::InvalidUrl(format!("{url}: {e}")))?;

        let base_path = parsed.path().trim_end_matches('/').to_string();
        let base_query = parsed.query().filter(|q| !q.is_empty()).map(String::from);

        Ok(BackendUrl {
            url: url.to_string(),
            scheme,
            authority,
            base_path,
            base_query,
        })
    }

    /// Get the underlying URL as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// `host[:port]`, also used as the outbound `Host` header.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn base_query(&self) -> Option<&str> {
        self.base_query.as_deref()
    }

    /// Join the base path with a request path using exactly one slash between them.
    pub fn join_path(&self, request_path: &str) -> String {
        if self.base_path.is_empty() {
            return request_path.to_string();
        }
        match request_path.strip_prefix('/') {
            Some("") => format!("{}/", self.base_path),
            Some(rest) => format!("{}/{rest}", self.base_path),
            None => format!("{}/{request_path}", self.base_path),
        }
    }

    /// Combine the base query with a request query (`base&request`).
    pub fn join_query(&self, request_query: Option<&str>) -> Option<String> {
        match (self.base_query(), request_query.filter(|q| !q.is_empty())) {
            (Some(base), Some(req)) => Some(format!("{base}&{req}")),
            (Some(base), None) => Some(base.to_string()),
            (None, Some(req)) => Some(req.to_string()),
            (None, None) => None,
        }
    }
}

impl FromStr for BackendUrl {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
