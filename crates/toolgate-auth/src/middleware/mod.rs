//! # Tower middleware for bearer-token authentication
//!
//! - [`BearerAuthLayer`] - a Tower Layer that wraps HTTP services
//! - [`BearerAuthService`] - extracts the bearer token, authenticates it and
//!   either forwards the request or answers 401
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tower::ServiceBuilder;
//! use toolgate_auth::middleware::{BearerAuthConfig, BearerAuthLayer};
//! use toolgate_auth::{TokenVerifier, VerifierConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = TokenVerifier::new(VerifierConfig::new("https://issuer.example/pool"))?;
//! let config = BearerAuthConfig::for_resource("https://mcp.example.com")?
//!     .bypass_path("/.well-known/oauth-protected-resource");
//!
//! let layer = BearerAuthLayer::new(verifier, config);
//! # let _ = ServiceBuilder::new().layer(layer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Responses
//!
//! | Request | Status | `WWW-Authenticate` | Body message |
//! |---------|--------|--------------------|--------------|
//! | No `Authorization` header | 401 | `Bearer resource_metadata="…"` | `authentication required` |
//! | Header not `Bearer <token>` | 401 | `…, error="invalid_request"` | `authentication required` |
//! | Token rejected | 401 | `…, error="invalid_token"` | `token validation failed` |
//! | Token accepted | inner service | | |
//!
//! ## Request Extensions
//!
//! On success the [`AuthContext`](crate::AuthContext) is inserted into the
//! request's extensions:
//!
//! ```rust,ignore
//! if let Some(auth) = req.extensions().get::<AuthContext>() {
//!     println!("Authenticated subject: {}", auth.subject);
//! }
//! ```

mod layer;
mod service;

pub use layer::BearerAuthLayer;
pub use service::{BearerAuthService, BearerAuthServiceFuture};

use crate::error::AuthResult;
use crate::server::{WwwAuthenticateBuilder, metadata_url};

/// Configuration for the bearer auth layer
#[derive(Debug, Clone)]
pub struct BearerAuthConfig {
    /// Discovery document URL advertised in challenges
    pub metadata_url: String,
    /// Request paths served without authentication (exact match)
    pub bypass_paths: Vec<String>,
    /// Scope advertised in challenges
    pub scope: Option<String>,
}

impl BearerAuthConfig {
    /// Config advertising `metadata_url`, with no bypass paths
    pub fn new(metadata_url: impl Into<String>) -> Self {
        Self {
            metadata_url: metadata_url.into(),
            bypass_paths: Vec::new(),
            scope: None,
        }
    }

    /// Config for a resource, advertising its well-known discovery URL
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::InvalidUrl`] if `resource_url` is not an
    /// absolute URL.
    pub fn for_resource(resource_url: &str) -> AuthResult<Self> {
        crate::config::parse_absolute_url("resource_url", resource_url)?;
        Ok(Self::new(metadata_url(resource_url)))
    }

    /// Add a path to the bypass list
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.bypass_paths.push(path.into());
        self
    }

    /// Advertise a scope in challenges
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Check if a path should bypass authentication
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }

    /// `WWW-Authenticate` value for a 401, with an optional RFC 6750 error code
    pub fn challenge(&self, error: Option<&str>) -> String {
        let mut builder = WwwAuthenticateBuilder::new(self.metadata_url.as_str());
        if let Some(scope) = &self.scope {
            builder = builder.with_scope(scope.as_str());
        }
        if let Some(error) = error {
            builder = builder.with_error(error, None);
        }
        builder.build()
    }
}
