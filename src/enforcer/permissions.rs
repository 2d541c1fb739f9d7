//! Permission requests submitted to the authorization service.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{EnforcerConfig, PathConfig};
use crate::facade::HttpRequest;

/// One resource, the scopes requested on it, and the claims pushed
/// alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub resource: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scopes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, Value>,
}

/// The full authorization question for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Client identifier of the resource server asking.
    pub resource_server: String,
    pub entries: Vec<PermissionEntry>,
}

impl PermissionRequest {
    /// Build the request for a matched path.
    ///
    /// Scopes come from the method-specific table when one matches,
    /// otherwise from the path-level list. With `http_method_as_scope`
    /// the request method itself is requested as a scope as well.
    pub fn for_path(
        config: &EnforcerConfig,
        path: &PathConfig,
        request: &dyn HttpRequest,
        claims: BTreeMap<String, Value>,
    ) -> Self {
        let mut scopes: BTreeSet<String> = path
            .scopes_for_method(request.method())
            .iter()
            .cloned()
            .collect();
        if config.http_method_as_scope {
            scopes.insert(request.method().to_ascii_uppercase());
        }

        Self {
            resource_server: config.resource_server_id.clone(),
            entries: vec![PermissionEntry {
                resource: path.resource_name().to_string(),
                scopes,
                claims,
            }],
        }
    }
}
