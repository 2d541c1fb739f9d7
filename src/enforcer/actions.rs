//! Response shaping applied around the authorization decision.

use http::StatusCode;

use crate::config::EnforcerConfig;
use crate::facade::{HttpRequest, HttpResponse};

/// Expose the challenge header to browser clients on CORS preflight.
///
/// Without this a cross-origin caller cannot read `WWW-Authenticate`
/// from a denied response, so it cannot discover how to authenticate.
/// Applies only to OPTIONS requests that carry an `Origin` header.
pub fn apply_cors_preflight(
    config: &EnforcerConfig,
    request: &dyn HttpRequest,
    response: &mut dyn HttpResponse,
) -> bool {
    if !config.cors.enabled
        || !request.method().eq_ignore_ascii_case("OPTIONS")
        || request.header("Origin").is_none()
    {
        return false;
    }

    let mut exposed = vec!["WWW-Authenticate".to_string()];
    for extra in &config.cors.exposed_headers {
        if !exposed.iter().any(|h| h.eq_ignore_ascii_case(extra)) {
            exposed.push(extra.clone());
        }
    }
    response.set_header("Access-Control-Expose-Headers", &exposed.join(", "));
    true
}

/// Shape a denied outcome onto the response.
///
/// With `on_deny_redirect_to` configured the caller is sent to that
/// location with a 302, otherwise the response is a plain 403. An
/// anonymous 403 carries the bearer challenge for the resource server.
pub fn apply_denial(
    config: &EnforcerConfig,
    request: &dyn HttpRequest,
    response: &mut dyn HttpResponse,
) {
    if let Some(target) = &config.on_deny_redirect_to {
        response.set_status(StatusCode::FOUND);
        response.set_header("Location", target);
        return;
    }

    response.set_status(StatusCode::FORBIDDEN);
    if request.security_context().is_none() {
        response.set_header(
            "WWW-Authenticate",
            &format!("Bearer realm=\"{}\"", config.resource_server_id),
        );
    }
}
