//! Gateway configuration
//!
//! Loaded from an optional file plus `TOOLGATE_*` environment variables.
//! Nested settings use `__`, e.g. `TOOLGATE_AUTH__ISSUER` or
//! `TOOLGATE_LOGGING__LEVEL`.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolgate_auth::{AuthError, VerifierConfig};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TOOLGATE";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// `bind_address` is not `host:port`
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    /// Verifier settings failed validation
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Public URL of this gateway, advertised as the protected resource
    pub resource_url: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Token verifier configuration
    pub auth: VerifierConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            structured: false,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info,toolgate_auth=debug".to_string()
}

impl GatewayConfig {
    /// Load from an optional file with `TOOLGATE_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if loading or deserialization fails, the bind address
    /// does not parse, or the verifier settings are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::load`].
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            // Environment variables override file settings
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.algorithms")
                    .with_list_parse_key("auth.scopes"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check settings that deserialization cannot
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable bind address or invalid verifier
    /// settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        self.auth.validate()?;
        Ok(())
    }

    /// Parsed listen address
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] when the address does not
    /// parse.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))
    }
}
