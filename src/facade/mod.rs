//! HTTP request/response facade.
//!
//! The enforcer never touches a concrete server framework directly; it
//! reads the request and shapes the response through these two traits.
//! `facade::mock` provides in-memory doubles, and the `middleware` module
//! adapts axum requests onto the same boundary.

pub mod mock;

use http::StatusCode;
pub use mock::{MockRequest, MockResponse};

/// Security context of an already-authenticated caller.
///
/// Token validation happens upstream; the enforcer only needs the bearer
/// token to present to the authorization service and the principal for
/// logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    pub principal: String,
    pub bearer_token: String,
}

impl SecurityContext {
    pub fn new(principal: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            bearer_token: bearer_token.into(),
        }
    }
}

/// Read-side capabilities the enforcer needs from an inbound request.
pub trait HttpRequest: Send + Sync {
    /// HTTP method, uppercase (`GET`, `OPTIONS`, ...).
    fn method(&self) -> &str;

    /// Request path, without query string.
    fn path(&self) -> &str;

    /// First value of a header, case-insensitive.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers(name).first().copied()
    }

    /// All values of a header, case-insensitive.
    fn headers(&self, name: &str) -> Vec<&str>;

    /// First value of a query or form parameter.
    fn first_param(&self, name: &str) -> Option<String>;

    /// Remote peer address, if known.
    fn remote_addr(&self) -> Option<&str> {
        None
    }

    /// Raw request body, if buffered.
    fn body(&self) -> Option<&[u8]> {
        None
    }

    /// Security context of the authenticated caller, absent for
    /// unauthenticated requests.
    fn security_context(&self) -> Option<&SecurityContext>;
}

/// Write-side capabilities the enforcer needs to shape a response.
pub trait HttpResponse: Send {
    fn set_status(&mut self, status: StatusCode);

    /// Replace a header with a single value.
    fn set_header(&mut self, name: &str, value: &str);

    /// Append a header value.
    fn add_header(&mut self, name: &str, value: &str);
}
