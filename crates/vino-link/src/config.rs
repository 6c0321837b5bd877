//! Client configuration.
//!
//! Configuration for the session client, including:
//! - Runtime environment and per-environment endpoints
//! - Reconnection backoff
//! - Transport timeouts

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::endpoint::{validate_endpoint, Endpoints, EnvironmentResolver, RuntimeEnv};
use crate::error::LinkError;
use crate::session::RetryConfig;

/// Reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    /// Consecutive reconnection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling for the delay between attempts, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportSettings {
    /// How long a connection attempt may take, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkConfig {
    /// Environment used to pick an endpoint.
    #[serde(default)]
    pub environment: RuntimeEnv,
    /// Session server addresses.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Reconnection settings.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Transport settings.
    #[serde(default)]
    pub transport: TransportSettings,
}

impl LinkConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LinkError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, LinkError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LinkError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, LinkError> {
        toml::to_string_pretty(self)
            .map_err(|e| LinkError::Config(format!("failed to serialize config: {e}")))
    }

    /// Write configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LinkError> {
        let content = self.to_toml()?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), LinkError> {
        if let Some(production) = &self.endpoints.production {
            validate_endpoint(production)
                .map_err(|e| LinkError::Config(format!("endpoints.production: {e}")))?;
        } else if self.environment == RuntimeEnv::Production {
            return Err(LinkError::Config(
                "endpoints.production is required when environment is production".to_string(),
            ));
        }
        validate_endpoint(&self.endpoints.development)
            .map_err(|e| LinkError::Config(format!("endpoints.development: {e}")))?;

        if self.retry.max_attempts == 0 {
            return Err(LinkError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(LinkError::Config(
                "retry.base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(LinkError::Config(format!(
                "retry.max_delay_ms ({}) must be at least retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        if self.transport.connect_timeout_ms == 0 {
            return Err(LinkError::Config(
                "transport.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Backoff configuration for the session client.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Connection attempt timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.connect_timeout_ms)
    }

    /// Endpoint resolver for the configured environment.
    #[must_use]
    pub fn resolver(&self) -> EnvironmentResolver {
        EnvironmentResolver::new(self.environment, self.endpoints.clone())
    }

    /// The endpoint the configured environment selects.
    ///
    /// # Errors
    ///
    /// Returns an error if production is selected without a production
    /// endpoint.
    pub fn endpoint(&self) -> Result<&str, LinkError> {
        self.endpoints.for_env(self.environment)
    }
}
