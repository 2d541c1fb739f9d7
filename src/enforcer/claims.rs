//! Claim resolution for authorization requests.
//!
//! Path configs may declare claims pushed to the authorization service
//! alongside the permission request. Each claim is backed by a source
//! expression resolved against the current request, or by a registered
//! supplier. Suppliers are memoized per request: a supplier is invoked
//! at most once no matter how many claims reference it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::facade::HttpRequest;

/// Expression forms recognized in claim definitions.
static HEADER_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{request\.header\['([^']+)'\]\}$").unwrap());
static PARAMETER_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{request\.parameter\['([^']+)'\]\}$").unwrap());
static REMOTE_ADDR_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{request\.remote_addr\}$").unwrap());
static SUPPLIER_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{supplier\['([^']+)'\]\}$").unwrap());

/// Parsed claim source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimSource {
    /// Value of a request header.
    Header(String),
    /// Value of a query or form parameter.
    Parameter(String),
    /// Peer address of the connection.
    RemoteAddr,
    /// A registered supplier, looked up by name.
    Supplier(String),
    /// The expression verbatim.
    Static(String),
}

impl ClaimSource {
    /// Parse a claim definition. Anything that is not a recognized
    /// interpolation form is a static value.
    pub fn parse(expr: &str) -> Self {
        if let Some(caps) = HEADER_EXPR.captures(expr) {
            ClaimSource::Header(caps[1].to_string())
        } else if let Some(caps) = PARAMETER_EXPR.captures(expr) {
            ClaimSource::Parameter(caps[1].to_string())
        } else if REMOTE_ADDR_EXPR.is_match(expr) {
            ClaimSource::RemoteAddr
        } else if let Some(caps) = SUPPLIER_EXPR.captures(expr) {
            ClaimSource::Supplier(caps[1].to_string())
        } else {
            ClaimSource::Static(expr.to_string())
        }
    }
}

/// Produces a claim value on demand.
///
/// Implemented for any `Fn(&dyn HttpRequest) -> Result<Value, String>`,
/// so plain closures can be registered directly.
pub trait ClaimSupplier: Send + Sync {
    fn supply(&self, request: &dyn HttpRequest) -> Result<Value, String>;
}

impl<F> ClaimSupplier for F
where
    F: Fn(&dyn HttpRequest) -> Result<Value, String> + Send + Sync,
{
    fn supply(&self, request: &dyn HttpRequest) -> Result<Value, String> {
        self(request)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("claim supplier '{name}' is not registered")]
    UnknownSupplier { name: String },

    #[error("claim supplier '{name}' failed: {reason}")]
    SupplierFailed { name: String, reason: String },
}

/// Resolves the claims of a path config against a request.
///
/// Lives for exactly one request. The supplier cache guarantees each
/// supplier runs at most once even when several claims name it.
pub struct ClaimResolver<'a> {
    suppliers: &'a HashMap<String, Arc<dyn ClaimSupplier>>,
    cache: HashMap<String, Value>,
}

impl<'a> ClaimResolver<'a> {
    pub fn new(suppliers: &'a HashMap<String, Arc<dyn ClaimSupplier>>) -> Self {
        Self {
            suppliers,
            cache: HashMap::new(),
        }
    }

    /// Resolve every configured claim. A supplier registered under the
    /// claim's own name takes precedence over the expression. Claims
    /// whose source yields nothing (absent header or parameter) are
    /// omitted rather than sent as null.
    pub fn resolve(
        &mut self,
        definitions: &BTreeMap<String, String>,
        request: &dyn HttpRequest,
    ) -> Result<BTreeMap<String, Value>, ClaimError> {
        let mut claims = BTreeMap::new();
        for (name, expr) in definitions {
            if let Some(value) = self.resolve_one(name, expr, request)? {
                claims.insert(name.clone(), value);
            }
        }
        Ok(claims)
    }

    fn resolve_one(
        &mut self,
        claim: &str,
        expr: &str,
        request: &dyn HttpRequest,
    ) -> Result<Option<Value>, ClaimError> {
        if self.suppliers.contains_key(claim) {
            return Ok(Some(self.from_supplier(claim, request)?));
        }
        let value = match ClaimSource::parse(expr) {
            ClaimSource::Header(name) => request.header(&name).map(Value::from),
            ClaimSource::Parameter(name) => request.first_param(&name).map(Value::from),
            ClaimSource::RemoteAddr => request.remote_addr().map(Value::from),
            ClaimSource::Static(value) => Some(Value::from(value)),
            ClaimSource::Supplier(name) => Some(self.from_supplier(&name, request)?),
        };
        Ok(value)
    }

    fn from_supplier(
        &mut self,
        name: &str,
        request: &dyn HttpRequest,
    ) -> Result<Value, ClaimError> {
        // Check the cache before invoking: a supplier must not run
        // twice within one request.
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }

        let supplier = self
            .suppliers
            .get(name)
            .ok_or_else(|| ClaimError::UnknownSupplier {
                name: name.to_string(),
            })?;
        let value = supplier
            .supply(request)
            .map_err(|reason| ClaimError::SupplierFailed {
                name: name.to_string(),
                reason,
            })?;
        self.cache.insert(name.to_string(), value.clone());
        Ok(value)
    }
}
