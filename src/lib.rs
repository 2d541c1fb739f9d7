//! Request-time policy enforcement for resource servers.
//!
//! A [`PolicyEnforcer`] is configured with a set of protected paths and
//! the address of an authorization service. For every request it picks
//! the most specific matching path, resolves any configured claims,
//! asks the service for a decision and shapes the response on denial.
//! The [`middleware`] module plugs the enforcer into an axum router.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use palisade::client::HttpAuthorizationClient;
//! use palisade::config::EnforcerConfig;
//! use palisade::enforcer::PolicyEnforcer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EnforcerConfig::from_file("palisade.toml")?;
//! let client = Arc::new(HttpAuthorizationClient::new(&config)?);
//! let enforcer = Arc::new(PolicyEnforcer::new(config, client));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod enforcer;
pub mod facade;
pub mod middleware;

pub use client::{AuthorizationClient, Evaluation, HttpAuthorizationClient};
pub use config::{EnforcementMode, EnforcerConfig, PathConfig};
pub use enforcer::{AuthorizationContext, Decision, PolicyEnforcer};
