//! Request-time policy enforcement.
//!
//! [`PolicyEnforcer`] sits in front of a resource server and decides,
//! per request, whether to let it through. It matches the request path
//! against the configured resources, resolves configured claims, asks
//! the remote authorization service for a decision, and shapes denied
//! responses (403, or a redirect when `on_deny_redirect_to` is set).
//!
//! The enforcer never grants by accident: unmapped paths are denied by
//! default and any failure to obtain a decision fails closed.

pub mod actions;
pub mod claims;
pub mod error;
pub mod matcher;
pub mod permissions;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{AuthorizationClient, Evaluation};
use crate::config::{EnforcementMode, EnforcerConfig, UnmappedPathPolicy};
use crate::enforcer::claims::{ClaimResolver, ClaimSupplier};
use crate::enforcer::error::EnforceError;
use crate::enforcer::matcher::PathMatcher;
use crate::enforcer::permissions::{PermissionEntry, PermissionRequest};
use crate::facade::{HttpRequest, HttpResponse};

/// What the enforcement pass concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
    /// No decision could be obtained. Always treated as a denial.
    Error(String),
}

/// Result of enforcing one request.
///
/// `is_granted` tells the caller whether to serve the request. In
/// permissive mode a request can proceed even though the recorded
/// decision is [`Decision::Denied`].
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    granted: bool,
    decision: Decision,
    reason: Option<String>,
    permissions: Vec<PermissionEntry>,
}

impl AuthorizationContext {
    fn granted(permissions: Vec<PermissionEntry>) -> Self {
        Self {
            granted: true,
            decision: Decision::Granted,
            reason: None,
            permissions,
        }
    }

    fn denied(reason: Option<String>) -> Self {
        Self {
            granted: false,
            decision: Decision::Denied,
            reason,
            permissions: Vec::new(),
        }
    }

    fn denied_but_permitted(reason: Option<String>) -> Self {
        Self {
            granted: true,
            decision: Decision::Denied,
            reason,
            permissions: Vec::new(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            granted: false,
            decision: Decision::Error(message),
            reason: None,
            permissions: Vec::new(),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Service-provided explanation for a denial, when available.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Permissions granted by the authorization service.
    pub fn permissions(&self) -> &[PermissionEntry] {
        &self.permissions
    }
}

/// The policy enforcement point.
///
/// Cheap to share: wrap it in an [`Arc`] and call
/// [`enforce`](Self::enforce) concurrently. All per-request state lives
/// on the stack of each call.
pub struct PolicyEnforcer {
    config: Arc<EnforcerConfig>,
    matcher: PathMatcher,
    client: Arc<dyn AuthorizationClient>,
    suppliers: HashMap<String, Arc<dyn ClaimSupplier>>,
}

impl PolicyEnforcer {
    pub fn new(config: EnforcerConfig, client: Arc<dyn AuthorizationClient>) -> Self {
        let matcher = PathMatcher::new(&config.paths);
        Self {
            config: Arc::new(config),
            matcher,
            client,
            suppliers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    /// Register a claim supplier. The name is matched against
    /// `{supplier['name']}` expressions and against claim names
    /// directly, where it overrides the configured expression. Within
    /// one request a supplier runs at most once regardless of how many
    /// claims reference it.
    pub fn register_supplier(
        &mut self,
        name: impl Into<String>,
        supplier: Arc<dyn ClaimSupplier>,
    ) {
        self.suppliers.insert(name.into(), supplier);
    }

    /// Enforce one request, shaping the response on denial.
    ///
    /// Repeated calls with the same request produce the same context
    /// and the same response shape.
    pub async fn enforce(
        &self,
        request: &dyn HttpRequest,
        response: &mut dyn HttpResponse,
    ) -> AuthorizationContext {
        if actions::apply_cors_preflight(&self.config, request, response) {
            debug!(path = %request.path(), "cors preflight, exposing challenge header");
            return AuthorizationContext::granted(Vec::new());
        }

        match self.check(request).await {
            Ok((_, evaluation)) if evaluation.granted => {
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    "authorization granted"
                );
                AuthorizationContext::granted(evaluation.permissions)
            }
            Ok((mode, evaluation)) => self.deny(mode, evaluation.reason, request, response),
            Err(EnforceError::Unauthenticated) => {
                // An anonymous request on an enforced path is denied
                // outright, even in permissive mode: there is no
                // decision to be permissive about.
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    "anonymous request on enforced path"
                );
                actions::apply_denial(&self.config, request, response);
                AuthorizationContext::denied(Some(
                    "request carries no bearer credentials".to_string(),
                ))
            }
            Err(EnforceError::NoMatchingPath) => {
                // Globally disabled enforcement grants everything,
                // mapped or not. Per-path overrides only apply to
                // matched paths.
                if self.config.enforcement_mode == EnforcementMode::Disabled {
                    debug!(path = %request.path(), "enforcement disabled globally");
                    return AuthorizationContext::granted(Vec::new());
                }
                match self.config.on_unmapped_path {
                    UnmappedPathPolicy::Permit => {
                        debug!(path = %request.path(), "unmapped path permitted by policy");
                        AuthorizationContext::granted(Vec::new())
                    }
                    UnmappedPathPolicy::Deny => self.deny(
                        self.config.enforcement_mode,
                        Some("no configured path matches the request".to_string()),
                        request,
                        response,
                    ),
                }
            }
            Err(err) => {
                warn!(
                    method = %request.method(),
                    path = %request.path(),
                    error = %err,
                    "authorization decision unavailable, failing closed"
                );
                actions::apply_denial(&self.config, request, response);
                AuthorizationContext::error(err.to_string())
            }
        }
    }

    /// Obtain a decision for a matched path. Disabled paths short
    /// circuit to a grant without contacting the service.
    async fn check(
        &self,
        request: &dyn HttpRequest,
    ) -> Result<(EnforcementMode, Evaluation), EnforceError> {
        let path = self
            .matcher
            .best(request.method(), request.path())
            .ok_or(EnforceError::NoMatchingPath)?;
        let mode = path.enforcement_mode.unwrap_or(self.config.enforcement_mode);

        if mode == EnforcementMode::Disabled {
            debug!(path = %request.path(), "enforcement disabled for path");
            return Ok((mode, Evaluation::granted(Vec::new())));
        }

        // Without credentials there is nothing to evaluate; the service
        // is never contacted.
        let security = request
            .security_context()
            .ok_or(EnforceError::Unauthenticated)?;

        let claims = ClaimResolver::new(&self.suppliers).resolve(&path.claims, request)?;
        let permission = PermissionRequest::for_path(&self.config, path, request, claims);

        let evaluation = self
            .client
            .authorize(&security.bearer_token, &permission)
            .await?;
        Ok((mode, evaluation))
    }

    fn deny(
        &self,
        mode: EnforcementMode,
        reason: Option<String>,
        request: &dyn HttpRequest,
        response: &mut dyn HttpResponse,
    ) -> AuthorizationContext {
        if mode == EnforcementMode::Permissive {
            warn!(
                method = %request.method(),
                path = %request.path(),
                reason = reason.as_deref().unwrap_or("unspecified"),
                "permissive mode, request proceeds despite denial"
            );
            return AuthorizationContext::denied_but_permitted(reason);
        }

        debug!(
            method = %request.method(),
            path = %request.path(),
            reason = reason.as_deref().unwrap_or("unspecified"),
            "authorization denied"
        );
        actions::apply_denial(&self.config, request, response);
        AuthorizationContext::denied(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::{json, Value};

    use super::*;
    use crate::client::ClientError;
    use crate::config::PathConfig;
    use crate::facade::{MockRequest, MockResponse};

    /// What the scripted client answers with.
    enum Script {
        Grant(Vec<PermissionEntry>),
        Deny(Option<String>),
        Fail,
    }

    struct ScriptedClient {
        script: Script,
        calls: AtomicUsize,
        last_request: Mutex<Option<PermissionRequest>>,
        last_token: Mutex<Option<String>>,
    }

    impl ScriptedClient {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
                last_token: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthorizationClient for ScriptedClient {
        async fn authorize(
            &self,
            token: &str,
            request: &PermissionRequest,
        ) -> Result<Evaluation, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            *self.last_token.lock().unwrap() = Some(token.to_string());
            match &self.script {
                Script::Grant(permissions) => Ok(Evaluation::granted(permissions.clone())),
                Script::Deny(reason) => Ok(Evaluation::denied(reason.clone())),
                Script::Fail => Err(ClientError::UnexpectedStatus { status: 500 }),
            }
        }
    }

    fn protected(path: &str) -> PathConfig {
        PathConfig {
            path: path.to_string(),
            ..Default::default()
        }
    }

    fn config(paths: Vec<PathConfig>) -> EnforcerConfig {
        EnforcerConfig {
            authorization_server_url: "http://localhost:8580".to_string(),
            resource_server_id: "test-app".to_string(),
            paths,
            ..Default::default()
        }
    }

    fn enforcer(config: EnforcerConfig, client: Arc<ScriptedClient>) -> PolicyEnforcer {
        PolicyEnforcer::new(config, client)
    }

    #[tokio::test]
    async fn test_granted_request_leaves_response_untouched() {
        let client = ScriptedClient::new(Script::Grant(vec![PermissionEntry {
            resource: "Resource A".to_string(),
            scopes: Default::default(),
            claims: Default::default(),
        }]));
        let enforcer = enforcer(config(vec![protected("/api/resourcea")]), client.clone());

        let request = MockRequest::get("/api/resourcea").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert_eq!(*context.decision(), Decision::Granted);
        assert_eq!(context.permissions().len(), 1);
        assert!(response.status().is_none());
        assert_eq!(client.last_token.lock().unwrap().as_deref(), Some("token-abc"));
    }

    #[tokio::test]
    async fn test_denied_request_gets_403() {
        let client = ScriptedClient::new(Script::Deny(Some("not entitled".to_string())));
        let enforcer = enforcer(config(vec![protected("/api/resourceb")]), client);

        let request = MockRequest::get("/api/resourceb").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert_eq!(*context.decision(), Decision::Denied);
        assert_eq!(context.reason(), Some("not entitled"));
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_anonymous_denial_carries_bearer_challenge() {
        let client = ScriptedClient::new(Script::Deny(None));
        let enforcer = enforcer(config(vec![protected("/api/resourceb")]), client.clone());

        let request = MockRequest::get("/api/resourceb");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(
            response.header("WWW-Authenticate"),
            Some("Bearer realm=\"test-app\""),
        );
        // No credentials, so the service was never asked.
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_request_denied_even_in_permissive_mode() {
        let client = ScriptedClient::new(Script::Grant(Vec::new()));
        let mut cfg = config(vec![protected("/api/resourceb")]);
        cfg.enforcement_mode = EnforcementMode::Permissive;
        let enforcer = enforcer(cfg, client.clone());

        let request = MockRequest::get("/api/resourceb");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_unmapped_path_denied_without_service_call() {
        let client = ScriptedClient::new(Script::Grant(Vec::new()));
        let enforcer = enforcer(config(vec![protected("/api/resourcea")]), client.clone());

        let request = MockRequest::get("/api/unmmaped").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_unmapped_path_permitted_by_policy() {
        let client = ScriptedClient::new(Script::Deny(None));
        let mut cfg = config(vec![protected("/api/resourcea")]);
        cfg.on_unmapped_path = UnmappedPathPolicy::Permit;
        let enforcer = enforcer(cfg, client.clone());

        let request = MockRequest::get("/api/unmmaped");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert!(response.status().is_none());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_path_grants_without_service_call() {
        let client = ScriptedClient::new(Script::Deny(None));
        let mut public = protected("/api/resource/public");
        public.enforcement_mode = Some(EnforcementMode::Disabled);
        let enforcer = enforcer(config(vec![public]), client.clone());

        let request = MockRequest::get("/api/resource/public");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert!(response.status().is_none());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_globally_disabled_mode_grants_everything_mapped() {
        let client = ScriptedClient::new(Script::Deny(None));
        let mut cfg = config(vec![protected("/api/resourceb")]);
        cfg.enforcement_mode = EnforcementMode::Disabled;
        let enforcer = enforcer(cfg, client.clone());

        let request = MockRequest::get("/api/resourceb");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_globally_disabled_mode_grants_unmapped_paths() {
        let client = ScriptedClient::new(Script::Deny(None));
        let mut cfg = config(vec![protected("/api/resourcea")]);
        cfg.enforcement_mode = EnforcementMode::Disabled;
        let enforcer = enforcer(cfg, client.clone());

        let request = MockRequest::get("/api/unmmaped");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert!(response.status().is_none());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_permissive_mode_proceeds_but_records_denial() {
        let client = ScriptedClient::new(Script::Deny(Some("not entitled".to_string())));
        let mut cfg = config(vec![protected("/api/resourceb")]);
        cfg.enforcement_mode = EnforcementMode::Permissive;
        let enforcer = enforcer(cfg, client);

        let request = MockRequest::get("/api/resourceb").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert_eq!(*context.decision(), Decision::Denied);
        assert!(response.status().is_none());
    }

    #[tokio::test]
    async fn test_deny_redirect_shapes_302() {
        let client = ScriptedClient::new(Script::Deny(None));
        let mut cfg = config(vec![protected("/api/resourceb")]);
        cfg.on_deny_redirect_to = Some("/accessDenied".to_string());
        let enforcer = enforcer(cfg, client);

        let request = MockRequest::get("/api/resourceb").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert_eq!(response.status(), Some(StatusCode::FOUND));
        assert_eq!(response.header("Location"), Some("/accessDenied"));
    }

    #[tokio::test]
    async fn test_cors_preflight_exposes_challenge_without_service_call() {
        let client = ScriptedClient::new(Script::Deny(None));
        let mut cfg = config(vec![protected("/api/resourcea")]);
        cfg.cors.enabled = true;
        let enforcer = enforcer(cfg, client.clone());

        let request = MockRequest::with_method("/api/resourcea", "OPTIONS")
            .header("Origin", "http://localhost:8180");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(context.is_granted());
        assert_eq!(
            response.header("Access-Control-Expose-Headers"),
            Some("WWW-Authenticate"),
        );
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_service_failure_fails_closed_even_in_permissive_mode() {
        let client = ScriptedClient::new(Script::Fail);
        let mut cfg = config(vec![protected("/api/resourcea")]);
        cfg.enforcement_mode = EnforcementMode::Permissive;
        let enforcer = enforcer(cfg, client);

        let request = MockRequest::get("/api/resourcea").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert!(matches!(context.decision(), Decision::Error(_)));
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_configured_claims_reach_the_service() {
        let client = ScriptedClient::new(Script::Grant(Vec::new()));
        let mut path = protected("/api/resourcea");
        path.claims.insert(
            "claim-a".to_string(),
            "{request.parameter['a']}".to_string(),
        );
        let enforcer = enforcer(config(vec![path]), client.clone());

        let request = MockRequest::get("/api/resourcea")
            .param("a", "claim-value")
            .authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        enforcer.enforce(&request, &mut response).await;

        let sent = client.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.entries[0].claims["claim-a"], json!("claim-value"));
    }

    #[tokio::test]
    async fn test_supplier_runs_once_per_enforce_call() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&invocations);

        let client = ScriptedClient::new(Script::Grant(Vec::new()));
        let mut path = protected("/api/resourcea");
        path.claims
            .insert("first".to_string(), "{supplier['session']}".to_string());
        path.claims
            .insert("second".to_string(), "{supplier['session']}".to_string());
        let mut enforcer = enforcer(config(vec![path]), client);
        enforcer.register_supplier(
            "session",
            Arc::new(move |_req: &dyn HttpRequest| -> Result<Value, String> {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(json!("session-state"))
            }),
        );

        let request = MockRequest::get("/api/resourcea").authenticated("marta", "token-abc");

        let mut response = MockResponse::new();
        enforcer.enforce(&request, &mut response).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        // A new request resolves afresh.
        let mut response = MockResponse::new();
        enforcer.enforce(&request, &mut response).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failing_supplier_fails_closed() {
        let client = ScriptedClient::new(Script::Grant(Vec::new()));
        let mut path = protected("/api/resourcea");
        path.claims
            .insert("claim".to_string(), "{supplier['broken']}".to_string());
        let mut enforcer = enforcer(config(vec![path]), client.clone());
        enforcer.register_supplier(
            "broken",
            Arc::new(|_req: &dyn HttpRequest| -> Result<Value, String> { Err("backend unavailable".to_string()) }),
        );

        let request = MockRequest::get("/api/resourcea").authenticated("marta", "token-abc");
        let mut response = MockResponse::new();
        let context = enforcer.enforce(&request, &mut response).await;

        assert!(!context.is_granted());
        assert!(matches!(context.decision(), Decision::Error(_)));
        assert_eq!(response.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_enforce_is_repeatable() {
        let client = ScriptedClient::new(Script::Deny(Some("not entitled".to_string())));
        let enforcer = enforcer(config(vec![protected("/api/resourceb")]), client);
        let request = MockRequest::get("/api/resourceb").authenticated("marta", "token-abc");

        let mut first = MockResponse::new();
        let first_context = enforcer.enforce(&request, &mut first).await;
        let mut second = MockResponse::new();
        let second_context = enforcer.enforce(&request, &mut second).await;

        assert_eq!(first_context.is_granted(), second_context.is_granted());
        assert_eq!(first_context.decision(), second_context.decision());
        assert_eq!(first.status(), second.status());
        assert_eq!(first.headers(), second.headers());
    }
}
