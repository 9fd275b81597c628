//! JWT infrastructure: key-set caching and bearer-token verification
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        TokenVerifier         │  attempt → Verified | Retryable | Terminal
//! │  issuer / audience / claims  │
//! └──────────────┬───────────────┘
//!                │ get_current / force_refresh
//! ┌──────────────▼───────────────┐
//! │         KeySetCache          │  lock-free fresh reads, single-flight refresh
//! └──────────────┬───────────────┘
//!                │ fetch
//! ┌──────────────▼───────────────┐
//! │   KeySource (HTTP JWKS)      │
//! └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `jwks` - key-set fetching and caching
//! - `validator` - token verification and the retry-on-unknown-key policy

pub mod jwks;
pub mod validator;

pub use jwks::{FetchError, HttpKeySource, KeySet, KeySetCache, KeySource};
pub use validator::{TokenVerifier, VerificationOutcome};

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registered claims per RFC 7519, as they appear on the wire
///
/// Claims not listed here are kept in `additional`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StandardClaims {
    /// Issuer (iss)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject (sub)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience (aud), a single string or an array
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration Time (exp) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Not Before (nbf) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,

    /// Issued At (iat) - Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// Additional claims not in RFC 7519
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

/// The `aud` claim, which RFC 7519 allows as a string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "client"`
    One(String),
    /// `"aud": ["client", "api"]`
    Many(Vec<String>),
}

impl Audience {
    /// Whether `expected` is one of the audiences
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }

    fn into_set(self) -> BTreeSet<String> {
        match self {
            Audience::One(aud) => BTreeSet::from([aud]),
            Audience::Many(auds) => auds.into_iter().collect(),
        }
    }
}

/// Claims of a verified token
///
/// Built fresh on every successful verification and owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// `sub`
    pub subject: String,
    /// `exp`, or one hour after verification when the token carries none
    pub expires_at: SystemTime,
    /// `iss`
    pub issuer: String,
    /// `aud`, normalized to a set
    pub audience: BTreeSet<String>,
    /// Every claim outside RFC 7519's registered set
    pub custom_claims: HashMap<String, Value>,
}

impl TokenClaims {
    pub(crate) fn from_standard(
        subject: String,
        issuer: String,
        expires_at: SystemTime,
        claims: StandardClaims,
    ) -> Self {
        Self {
            subject,
            expires_at,
            issuer,
            audience: claims.aud.map(Audience::into_set).unwrap_or_default(),
            custom_claims: claims.additional,
        }
    }

    /// A custom claim by name; `None` when absent
    pub fn custom_claim(&self, name: &str) -> Option<&Value> {
        self.custom_claims.get(name)
    }

    /// A custom claim as a string; `None` when absent or not a string
    pub fn custom_str(&self, name: &str) -> Option<&str> {
        self.custom_claim(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audience_string_or_array() {
        let one: StandardClaims = serde_json::from_value(json!({"aud": "client"})).unwrap();
        assert_eq!(one.aud, Some(Audience::One("client".to_string())));
        assert!(one.aud.unwrap().contains("client"));

        let many: StandardClaims =
            serde_json::from_value(json!({"aud": ["api", "client"]})).unwrap();
        let aud = many.aud.unwrap();
        assert!(aud.contains("client"));
        assert!(!aud.contains("other"));
    }

    #[test]
    fn test_additional_claims_captured() {
        let claims: StandardClaims = serde_json::from_value(json!({
            "sub": "user-123",
            "custom:org_id": "org-456",
            "email": "a@example.com"
        }))
        .unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-123"));
        assert_eq!(claims.additional["custom:org_id"], "org-456");
        assert!(!claims.additional.contains_key("sub"));
    }

    #[test]
    fn test_custom_claim_accessors() {
        let claims: StandardClaims = serde_json::from_value(json!({
            "aud": ["a", "b", "a"],
            "custom:org_id": "org-456",
            "custom:seats": 12
        }))
        .unwrap();
        let token = TokenClaims::from_standard(
            "user-123".to_string(),
            "https://issuer.example".to_string(),
            SystemTime::now(),
            claims,
        );

        assert_eq!(token.audience.len(), 2);
        assert_eq!(token.custom_str("custom:org_id"), Some("org-456"));
        assert_eq!(token.custom_str("custom:seats"), None);
        assert_eq!(token.custom_claim("custom:seats"), Some(&json!(12)));
        assert!(token.custom_claim("missing").is_none());
    }
}
