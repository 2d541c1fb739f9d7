//! Axum integration.
//!
//! [`enforce`] wraps a router so every request passes through the
//! [`PolicyEnforcer`] before reaching a handler. Granted requests carry
//! their [`AuthorizationContext`] as a request extension, so handlers
//! can inspect the granted permissions. Denied requests are answered
//! directly with the shaped status and headers.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{HeaderMap, StatusCode};
use tracing::warn;

use crate::enforcer::PolicyEnforcer;
use crate::facade::{HttpRequest, HttpResponse, SecurityContext};

pub use crate::enforcer::AuthorizationContext;

/// Middleware entry point, used with `axum::middleware::from_fn_with_state`.
pub async fn enforce(
    State(enforcer): State<Arc<PolicyEnforcer>>,
    request: Request,
    next: Next,
) -> Response {
    let facade = RequestFacade::from_request(&request);
    let mut shaped = ShapedResponse::default();
    let context = enforcer.enforce(&facade, &mut shaped).await;

    if !context.is_granted() {
        return shaped.into_response();
    }

    let mut request = request;
    request.extensions_mut().insert(context);
    let mut response = next.run(request).await;
    // Headers recorded during enforcement (the CORS expose header on
    // preflight) still apply to a granted request.
    shaped.overlay_headers(response.headers_mut());
    response
}

/// Read-side facade over an axum request.
struct RequestFacade {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
    security: Option<SecurityContext>,
}

impl RequestFacade {
    fn from_request(request: &Request) -> Self {
        let headers = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let params = request
            .uri()
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        // An upstream auth layer may have attached a full security
        // context. Otherwise a raw bearer token still identifies the
        // caller to the authorization service.
        let security = request
            .extensions()
            .get::<SecurityContext>()
            .cloned()
            .or_else(|| {
                bearer_token(request.headers())
                    .map(|token| SecurityContext::new(String::new(), token))
            });

        Self {
            method: request.method().as_str().to_string(),
            path: request.uri().path().to_string(),
            headers,
            params,
            security,
        }
    }
}

impl HttpRequest for RequestFacade {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn headers(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    fn first_param(&self, name: &str) -> Option<String> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn security_context(&self) -> Option<&SecurityContext> {
        self.security.as_ref()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Write-side facade recording the shape the enforcer applied.
#[derive(Debug, Default)]
struct ShapedResponse {
    status: Option<StatusCode>,
    headers: Vec<(String, String)>,
}

impl ShapedResponse {
    fn into_response(self) -> Response {
        let status = self.status.unwrap_or(StatusCode::FORBIDDEN);
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        self.overlay_headers(response.headers_mut());
        response
    }

    fn overlay_headers(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            let Ok(name) = HeaderName::try_from(name.as_str()) else {
                warn!(header = %name, "dropping invalid header name from enforcement");
                continue;
            };
            let Ok(value) = HeaderValue::try_from(value.as_str()) else {
                warn!(header = %name, "dropping invalid header value from enforcement");
                continue;
            };
            target.append(name, value);
        }
    }
}

impl HttpResponse for ShapedResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }
}
