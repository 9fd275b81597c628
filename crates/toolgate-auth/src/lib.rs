//! # Toolgate Auth - Bearer-Token Verification for an MCP Gateway
//!
//! Authenticates inbound MCP requests in hosted mode: OIDC-style JWT
//! validation against a remote key set, with caching, refresh-on-miss,
//! issuer/audience checks and strict error-message sanitization.
//!
//! ## Key Features
//!
//! - **Key-set cache** - TTL-based, lock-free fresh reads, single-flight refresh
//! - **Key rotation** - an unknown key ID triggers exactly one forced refresh
//! - **Uniform failures** - callers only ever see one of two fixed messages
//! - **RFC 9728** - protected-resource metadata and `WWW-Authenticate` challenges
//! - **Tower middleware** - drop-in bearer authentication for axum/hyper stacks
//!
//! ## Architecture
//!
//! - [`config`] - `VerifierConfig`, loaded from code, files or environment
//! - [`jwt`] - key-set cache and token verifier
//! - [`context`] - normalized `AuthContext` and the `TokenAuthenticator` seam
//! - [`server`] - discovery metadata, challenges, bearer extraction
//! - [`sanitize`] - the public error boundary
//! - [`middleware`] - Tower layer (feature `middleware`, on by default)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toolgate_auth::{TokenAuthenticator, TokenVerifier, VerifierConfig, sanitize};
//!
//! # tokio_test::block_on(async {
//! let config = VerifierConfig::cognito("us-east-1", "us-east-1_AbCdEf")
//!     .with_audience("my-app-client-id");
//! let verifier = TokenVerifier::new(config)?;
//!
//! match verifier.authenticate("eyJhbGciOiJSUzI1NiIs...", None).await {
//!     Ok(auth) => println!("{} from org {:?}", auth.subject, auth.org_id()),
//!     Err(reason) => {
//!         // Only the sanitized message goes back to the caller
//!         let message = sanitize::to_public_message(reason);
//!         assert_eq!(message, "token validation failed");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower `BearerAuthLayer`
//!
//! ## Standards Compliance
//!
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 6750** - Bearer Token Usage
//! - **RFC 9728** - OAuth 2.0 Protected Resource Metadata

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod context;
pub mod error;
pub mod jwt;
#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod middleware;
pub mod sanitize;
pub mod server;

#[doc(inline)]
pub use config::VerifierConfig;

#[doc(inline)]
pub use context::{AuthContext, TokenAuthenticator};

#[doc(inline)]
pub use error::{AuthError, AuthResult, FailureReason};

#[doc(inline)]
pub use jwt::{KeySetCache, TokenClaims, TokenVerifier, VerificationOutcome};

#[doc(inline)]
pub use server::{ProtectedResourceMetadata, build_metadata, metadata_url};

#[cfg(feature = "middleware")]
#[doc(inline)]
pub use middleware::{BearerAuthConfig, BearerAuthLayer};
