//! Error types for token verification
//!
//! Two families live here:
//!
//! - [`FailureReason`] classifies why a bearer token was rejected. It is an
//!   internal, operator-facing label: it is logged, never sent to callers.
//!   The public text is produced by [`crate::sanitize`].
//! - [`AuthError`] covers configuration and helper failures (bad URLs, bad
//!   headers, unreadable config files). These happen at startup or while
//!   parsing request headers, before any token is verified.

use thiserror::Error;

/// Why a token verification failed
///
/// Every variant is a caller-input or environment condition; none of them is
/// fatal to the process. The `Display` form is a stable snake_case label
/// suitable for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FailureReason {
    /// The key set could not be fetched (network error, non-2xx, bad JSON, timeout)
    #[error("key_source_unreachable")]
    KeySourceUnreachable,
    /// Signature did not verify, algorithm not allowed, or no usable key
    #[error("signature_invalid")]
    SignatureInvalid,
    /// `exp` in the past or `nbf` in the future (beyond the configured leeway)
    #[error("token_expired")]
    TokenExpired,
    /// `iss` does not equal the configured issuer
    #[error("issuer_mismatch")]
    IssuerMismatch,
    /// Configured audience missing from `aud`
    #[error("audience_mismatch")]
    AudienceMismatch,
    /// The token could not be parsed at all
    #[error("malformed_token")]
    MalformedToken,
}

impl FailureReason {
    /// Every failure reason, in declaration order
    pub const ALL: [FailureReason; 6] = [
        FailureReason::KeySourceUnreachable,
        FailureReason::SignatureInvalid,
        FailureReason::TokenExpired,
        FailureReason::IssuerMismatch,
        FailureReason::AudienceMismatch,
        FailureReason::MalformedToken,
    ];

    /// Stable snake_case label (same as `Display`)
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::KeySourceUnreachable => "key_source_unreachable",
            FailureReason::SignatureInvalid => "signature_invalid",
            FailureReason::TokenExpired => "token_expired",
            FailureReason::IssuerMismatch => "issuer_mismatch",
            FailureReason::AudienceMismatch => "audience_mismatch",
            FailureReason::MalformedToken => "malformed_token",
        }
    }
}

/// Configuration and helper errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// A URL was empty, relative, or unparseable
    #[error("invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Which setting or argument carried the URL
        field: &'static str,
        /// Parser message
        reason: String,
    },

    /// Key source uses plain HTTP on a non-loopback host
    #[error("key source must use HTTPS (HTTP only allowed for loopback hosts): {0}")]
    InsecureKeySource(String),

    /// Configuration could not be loaded or deserialized
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client for key fetching could not be built
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Authorization header missing or not in `Bearer <token>` form
    #[error("authorization header must have format: Bearer <token>")]
    InvalidAuthorizationHeader,

    /// A header value could not be constructed from the token
    #[error("token contains characters not allowed in a header value")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

/// Result alias for configuration and helper operations
pub type AuthResult<T> = Result<T, AuthError>;
