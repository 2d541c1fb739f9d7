//! In-memory facade doubles for tests and embedding.
//!
//! `MockRequest`/`MockResponse` implement the facade traits without a
//! server, which is also how the enforcer's own test suite drives full
//! enforcement passes.

use std::collections::HashMap;

use http::StatusCode;

use super::{HttpRequest, HttpResponse, SecurityContext};

/// In-memory request double with builder-style setup.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    method: Option<String>,
    path: String,
    headers: Vec<(String, String)>,
    params: HashMap<String, String>,
    body: Option<Vec<u8>>,
    remote_addr: Option<String>,
    security: Option<SecurityContext>,
}

impl MockRequest {
    /// A GET request to the given path.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// A request with an explicit method.
    pub fn with_method(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into().to_ascii_uppercase()),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Attach an authenticated security context with the given token.
    pub fn authenticated(mut self, principal: impl Into<String>, token: impl Into<String>) -> Self {
        self.security = Some(SecurityContext::new(principal, token));
        self
    }
}

impl HttpRequest for MockRequest {
    fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn headers(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn first_param(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned()
    }

    fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    fn security_context(&self) -> Option<&SecurityContext> {
        self.security.as_ref()
    }
}

/// In-memory response double recording status and headers.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    status: Option<StatusCode>,
    headers: Vec<(String, String)>,
}

impl MockResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status set by the enforcer, if any. A granted pass leaves the
    /// response untouched.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl HttpResponse for MockResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }
}
