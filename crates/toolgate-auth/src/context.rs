//! Normalized identity handed to the request-authorization layer
//!
//! An [`AuthContext`] is what a tool handler sees once the bearer token has
//! been verified: who the caller is, until when, with which scopes, and an
//! extensible claim map. The map always carries the original token under
//! [`RAW_TOKEN_KEY`] so the gateway can forward it to the backend unchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthResult, FailureReason};
use crate::jwt::TokenClaims;

/// Extra-map key holding the token exactly as presented
pub const RAW_TOKEN_KEY: &str = "raw_token";

/// Extra-map key holding the subject
pub const SUBJECT_KEY: &str = "sub";

/// Extra-map key holding the organization identifier (empty when absent)
pub const ORG_ID_KEY: &str = "org_id";

/// Authenticated caller identity
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Subject (`sub`)
    pub subject: String,

    /// When the credential stops being valid
    pub expires_at: SystemTime,

    /// Scopes granted to the caller
    pub scopes: Vec<String>,

    /// Claim map; always contains `raw_token`, `sub` and `org_id`
    pub extra: HashMap<String, Value>,
}

impl fmt::Debug for AuthContext {
    // raw_token is a live credential; keep it out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra_keys: Vec<&String> = self.extra.keys().collect();
        f.debug_struct("AuthContext")
            .field("subject", &self.subject)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("org_id", &self.org_id())
            .field("extra_keys", &extra_keys)
            .finish()
    }
}

impl AuthContext {
    /// Build the identity for verified claims
    ///
    /// `org_claim` names the custom claim copied into `org_id`; a missing or
    /// non-string claim yields an empty string.
    pub fn from_claims(
        claims: TokenClaims,
        raw_token: String,
        org_claim: &str,
        scopes: &[String],
    ) -> Self {
        let org_id = claims.custom_str(org_claim).unwrap_or_default().to_string();

        let extra = HashMap::from([
            (RAW_TOKEN_KEY.to_string(), Value::String(raw_token)),
            (SUBJECT_KEY.to_string(), Value::String(claims.subject.clone())),
            (ORG_ID_KEY.to_string(), Value::String(org_id)),
        ]);

        Self {
            subject: claims.subject,
            expires_at: claims.expires_at,
            scopes: scopes.to_vec(),
            extra,
        }
    }

    /// The token this identity was derived from
    pub fn raw_token(&self) -> Option<&str> {
        self.extra_str(RAW_TOKEN_KEY)
    }

    /// Organization identifier; `Some("")` when the token carried none
    pub fn org_id(&self) -> Option<&str> {
        self.extra_str(ORG_ID_KEY)
    }

    /// A string value from the claim map
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Check if the identity has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether `expires_at` has passed
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// `Authorization` header value for forwarding the caller's token
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::InvalidAuthorizationHeader`] when the
    /// context has no raw token, or an invalid-header error when the token
    /// contains characters not allowed in a header.
    pub fn bearer_header(&self) -> AuthResult<HeaderValue> {
        let token = self
            .raw_token()
            .filter(|t| !t.is_empty())
            .ok_or(crate::AuthError::InvalidAuthorizationHeader)?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Turns a presented bearer token into an identity
///
/// [`crate::TokenVerifier`] is the production implementation. The request
/// parts are passed through for authenticators that bind tokens to request
/// properties.
#[async_trait]
pub trait TokenAuthenticator: Send + Sync {
    /// Authenticate a raw bearer token
    ///
    /// # Errors
    ///
    /// Returns the classified reason the token was rejected. Callers must map
    /// it through [`crate::sanitize`] before answering the client.
    async fn authenticate(
        &self,
        token: &str,
        request: Option<&http::request::Parts>,
    ) -> Result<AuthContext, FailureReason>;
}

#[async_trait]
impl<T: TokenAuthenticator + ?Sized> TokenAuthenticator for Arc<T> {
    async fn authenticate(
        &self,
        token: &str,
        request: Option<&http::request::Parts>,
    ) -> Result<AuthContext, FailureReason> {
        (**self).authenticate(token, request).await
    }
}
