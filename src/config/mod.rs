//! Configuration for the policy enforcement engine.
//!
//! The enforcer is configured via a TOML file (JSON is also accepted for
//! parity with adapter-style deployments), with all sections optional
//! except the authorization server coordinates.
//!
//! # Example
//!
//! ```toml
//! authorization_server_url = "http://localhost:8543"
//! resource_server_id = "resource-server-test"
//! enforcement_mode = "enforcing"
//! on_deny_redirect_to = "/accessDenied"
//!
//! [[paths]]
//! name = "Resource A"
//! path = "/api/resourcea"
//! ```

mod paths;

use std::path::Path;

pub use paths::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Root configuration for the policy enforcer.
///
/// Immutable after load; one instance is shared (via `Arc`) by every
/// in-flight enforcement pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnforcerConfig {
    /// Base URL of the remote authorization service.
    pub authorization_server_url: String,

    /// Identifier this resource server presents to the authorization
    /// service (and uses as the `WWW-Authenticate` realm).
    pub resource_server_id: String,

    /// Global enforcement mode. Per-path overrides win.
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,

    /// Where to redirect denied requests instead of answering 403.
    /// Bearer-only deployments leave this unset.
    #[serde(default)]
    pub on_deny_redirect_to: Option<String>,

    /// When set, the request's HTTP method is added as a scope on every
    /// permission entry.
    #[serde(default)]
    pub http_method_as_scope: bool,

    /// What to do with requests whose path matches no configured
    /// resource. Defaults to deny.
    #[serde(default)]
    pub on_unmapped_path: UnmappedPathPolicy,

    /// CORS preflight handling.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Outbound HTTP client tuning for the authorization call.
    #[serde(default)]
    pub http_client: HttpClientConfig,

    /// Protected resource path definitions. Order is the final tie-break
    /// when two templates are equally specific.
    #[serde(default)]
    pub paths: Vec<PathConfig>,
}

impl EnforcerConfig {
    /// Load configuration from a file, dispatching on extension
    /// (`.toml` or `.json`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents)?,
            Some("toml") | None => Self::from_toml_str(&contents)?,
            Some(other) => {
                return Err(ConfigError::UnsupportedFormat(other.to_string()));
            }
        };
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, normalizing where possible.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        Url::parse(&self.authorization_server_url).map_err(|e| ConfigError::InvalidServerUrl {
            url: self.authorization_server_url.clone(),
            reason: e.to_string(),
        })?;
        // Trailing slash would produce `//authorize` when joining.
        while self.authorization_server_url.ends_with('/') {
            self.authorization_server_url.pop();
        }

        if self.resource_server_id.is_empty() {
            return Err(ConfigError::MissingResourceServerId);
        }

        if let Some(target) = &self.on_deny_redirect_to
            && !(target.starts_with('/') || Url::parse(target).is_ok())
        {
            return Err(ConfigError::InvalidRedirectTarget(target.clone()));
        }

        for path in &self.paths {
            path.validate()?;
        }

        Ok(())
    }

    /// The URL of the authorization service's decision endpoint.
    pub fn decision_endpoint(&self) -> String {
        format!("{}/authorize", self.authorization_server_url)
    }
}

/// CORS preflight configuration.
///
/// When enabled, OPTIONS requests carrying an `Origin` header get
/// `Access-Control-Expose-Headers` set so browser clients can read the
/// `WWW-Authenticate` challenge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Extra headers to expose in addition to `WWW-Authenticate`.
    #[serde(default)]
    pub exposed_headers: Vec<String>,
}

/// Outbound HTTP client settings for the authorization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    /// Total request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config file format: .{0}")]
    UnsupportedFormat(String),

    #[error("invalid authorization server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("resource_server_id must not be empty")]
    MissingResourceServerId,

    #[error("on_deny_redirect_to must be an absolute path or URL, got '{0}'")]
    InvalidRedirectTarget(String),

    #[error("path template '{path}' is invalid: {reason}")]
    InvalidPathTemplate { path: String, reason: String },
}
