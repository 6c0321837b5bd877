//! Endpoint resolution.
//!
//! Picks the session server address for the runtime environment the
//! trainer is running in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LinkError;

/// Runtime environment used to select an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    /// Deployed trainer.
    Production,
    /// Local development server.
    #[default]
    Development,
}

impl fmt::Display for RuntimeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => f.write_str("production"),
            Self::Development => f.write_str("development"),
        }
    }
}

impl FromStr for RuntimeEnv {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(LinkError::Config(format!(
                "unknown environment '{other}', expected production or development"
            ))),
        }
    }
}

/// Session server addresses per environment.
///
/// There is no default production address; it must be configured before
/// the production environment can be selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Address used in production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<String>,
    /// Address used during development.
    pub development: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            production: None,
            development: "ws://127.0.0.1:8080/ws".to_string(),
        }
    }
}

impl Endpoints {
    /// The address for `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if `env` is production and no production address
    /// is configured.
    pub fn for_env(&self, env: RuntimeEnv) -> Result<&str, LinkError> {
        match env {
            RuntimeEnv::Production => self.production.as_deref().ok_or_else(|| {
                LinkError::Endpoint("endpoints.production is not configured".to_string())
            }),
            RuntimeEnv::Development => Ok(&self.development),
        }
    }
}

/// Check that `endpoint` is a WebSocket URL.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, LinkError> {
    let url = Url::parse(endpoint)
        .map_err(|e| LinkError::Endpoint(format!("invalid endpoint '{endpoint}': {e}")))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(LinkError::Endpoint(format!(
            "invalid endpoint '{endpoint}': scheme must be ws or wss, got {scheme}"
        ))),
    }
}

/// Resolves the address to connect to.
///
/// Called once per connection attempt, so a resolver may return a
/// different address over time.
pub trait EndpointResolver: Send + Sync + 'static {
    /// The address for the next connection attempt.
    fn resolve(&self) -> Result<String, LinkError>;
}

impl<F> EndpointResolver for F
where
    F: Fn() -> Result<String, LinkError> + Send + Sync + 'static,
{
    fn resolve(&self) -> Result<String, LinkError> {
        self()
    }
}

/// Always resolves to the same address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEndpoint(String);

impl FixedEndpoint {
    /// Create a resolver for `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self(endpoint.into())
    }
}

impl EndpointResolver for FixedEndpoint {
    fn resolve(&self) -> Result<String, LinkError> {
        Ok(self.0.clone())
    }
}

/// Selects the production or development address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentResolver {
    env: RuntimeEnv,
    endpoints: Endpoints,
}

impl EnvironmentResolver {
    /// Create a resolver for `env`.
    #[must_use]
    pub const fn new(env: RuntimeEnv, endpoints: Endpoints) -> Self {
        Self { env, endpoints }
    }

    /// The environment this resolver selects for.
    #[must_use]
    pub const fn env(&self) -> RuntimeEnv {
        self.env
    }
}

impl EndpointResolver for EnvironmentResolver {
    fn resolve(&self) -> Result<String, LinkError> {
        let endpoint = self.endpoints.for_env(self.env)?;
        validate_endpoint(endpoint)?;
        Ok(endpoint.to_string())
    }
}
