//! Client for the remote authorization service.
//!
//! The enforcer never evaluates policies itself. It submits a
//! [`PermissionRequest`] and acts on the returned [`Evaluation`]. The
//! trait seam lets tests drive the enforcer with a scripted client while
//! production uses [`HttpAuthorizationClient`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::EnforcerConfig;
use crate::enforcer::permissions::{PermissionEntry, PermissionRequest};

/// Outcome of a policy evaluation.
///
/// A denial is a successful evaluation with `granted == false`. Errors
/// are reserved for failures to obtain a decision at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub granted: bool,
    /// Permissions the service actually granted.
    #[serde(default)]
    pub permissions: Vec<PermissionEntry>,
    /// Service-provided explanation for a denial, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Evaluation {
    pub fn granted(permissions: Vec<PermissionEntry>) -> Self {
        Self {
            granted: true,
            permissions,
            reason: None,
        }
    }

    pub fn denied(reason: Option<String>) -> Self {
        Self {
            granted: false,
            permissions: Vec::new(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authorization request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authorization service returned unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("authorization service returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Asks the authorization service whether a request is permitted.
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    async fn authorize(
        &self,
        token: &str,
        request: &PermissionRequest,
    ) -> Result<Evaluation, ClientError>;
}

/// Production client speaking JSON over HTTP.
pub struct HttpAuthorizationClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAuthorizationClient {
    pub fn new(config: &EnforcerConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_client.timeout_secs))
            .connect_timeout(Duration::from_secs(config.http_client.connect_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.decision_endpoint(),
        })
    }
}

#[async_trait]
impl AuthorizationClient for HttpAuthorizationClient {
    async fn authorize(
        &self,
        token: &str,
        request: &PermissionRequest,
    ) -> Result<Evaluation, ClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        debug!(status = %status, endpoint = %self.endpoint, "authorization decision received");

        // 403 is a decision, not a failure: the service evaluated the
        // request and denied it.
        if status == reqwest::StatusCode::FORBIDDEN {
            let reason = response
                .json::<DenialBody>()
                .await
                .ok()
                .and_then(|body| body.reason);
            return Ok(Evaluation::denied(reason));
        }

        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        response
            .json::<Evaluation>()
            .await
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct DenialBody {
    #[serde(default)]
    reason: Option<String>,
}
