//! Protected resource path definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Per-path enforcement policy.
///
/// - `Enforcing`: a grant from the authorization service is required.
/// - `Permissive`: evaluation still runs (for logging), but an explicit
///   deny does not block the request.
/// - `Disabled`: evaluation is skipped entirely; the request is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementMode {
    #[default]
    Enforcing,
    Permissive,
    Disabled,
}

/// Policy for requests whose path matches no configured resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmappedPathPolicy {
    /// Deny with 403 (or the configured redirect). The safe default.
    #[default]
    Deny,
    /// Let the request through without an authorization call.
    Permit,
}

/// A protected resource path.
///
/// The template supports literal segments, `{param}` placeholders and a
/// trailing `/*` wildcard (`/api/{id}/files/*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathConfig {
    /// Resource name submitted to the authorization service. Falls back
    /// to the path template when unset.
    #[serde(default)]
    pub name: Option<String>,

    /// Path template this config protects.
    pub path: String,

    /// Scopes requested for any method not listed in `methods`.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Method-specific scope overrides. A config listing methods only
    /// matches requests using one of them.
    #[serde(default)]
    pub methods: Vec<MethodConfig>,

    /// Per-path enforcement mode override.
    #[serde(default)]
    pub enforcement_mode: Option<EnforcementMode>,

    /// Claim-information-point definitions: claim name to source
    /// expression (`{request.header['X-Foo']}`,
    /// `{request.parameter['a']}`, `{request.remote_addr}`, or a static
    /// value).
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl PathConfig {
    /// Resource name to submit for this path.
    pub fn resource_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }

    /// Whether this config applies to the given HTTP method.
    pub fn applies_to_method(&self, method: &str) -> bool {
        self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|m| m.method.eq_ignore_ascii_case(method))
    }

    /// Scopes for the given method: the method-specific table wins,
    /// otherwise the path-level scopes.
    pub fn scopes_for_method(&self, method: &str) -> &[String] {
        self.methods
            .iter()
            .find(|m| m.method.eq_ignore_ascii_case(method))
            .map(|m| m.scopes.as_slice())
            .unwrap_or(&self.scopes)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPathTemplate {
                path: self.path.clone(),
                reason: "must start with '/'".to_string(),
            });
        }
        if let Some(pos) = self.path.find('*')
            && pos != self.path.len() - 1
        {
            return Err(ConfigError::InvalidPathTemplate {
                path: self.path.clone(),
                reason: "wildcard '*' is only allowed at the end".to_string(),
            });
        }
        for method in &self.methods {
            if method.method.is_empty() {
                return Err(ConfigError::InvalidPathTemplate {
                    path: self.path.clone(),
                    reason: "method name must not be empty".to_string(),
                });
            }
        }
        for claim in self.claims.keys() {
            if claim.is_empty() {
                return Err(ConfigError::InvalidPathTemplate {
                    path: self.path.clone(),
                    reason: "claim name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Scopes requested for a specific HTTP method on a path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodConfig {
    pub method: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}
