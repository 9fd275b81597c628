//! Verifier configuration
//!
//! [`VerifierConfig`] is immutable once a verifier is built. It deserializes
//! with serde defaults for everything except the issuer, and can be loaded
//! from a TOML/YAML/JSON file and `TOOLGATE_AUTH_*` environment variables
//! through the `config` crate.
//!
//! ```rust
//! use std::time::Duration;
//! use toolgate_auth::VerifierConfig;
//!
//! let config = VerifierConfig::new("https://issuer.example/pool")
//!     .with_audience("my-client-id")
//!     .with_cache_ttl(Duration::from_secs(600));
//!
//! assert_eq!(
//!     config.key_source_url(),
//!     "https://issuer.example/pool/.well-known/jwks.json"
//! );
//! ```

use std::path::Path;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::{AuthError, AuthResult};

/// Vendor-specific claim carrying the organization identifier
pub const DEFAULT_ORG_CLAIM: &str = "custom:org_id";

/// Path appended to the issuer when no key-set URL is configured
pub const JWKS_WELL_KNOWN_PATH: &str = "/.well-known/jwks.json";

/// Environment variable prefix used by [`VerifierConfig::from_env`]
pub const ENV_PREFIX: &str = "TOOLGATE_AUTH";

/// Token verifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Expected `iss` claim, compared byte for byte
    pub issuer: String,

    /// Expected `aud` entry; `None` or empty disables the audience check
    #[serde(default)]
    pub audience: Option<String>,

    /// Key-set URL; defaults to `{issuer}/.well-known/jwks.json`
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// How long a fetched key set stays fresh
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Upper bound on a single key-set fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Clock skew tolerated on `exp` and `nbf`; zero unless configured
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Accepted signing algorithms (asymmetric only)
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,

    /// Claim read into the identity's `org_id`
    #[serde(default = "default_org_claim")]
    pub org_claim: String,

    /// Scopes attached to every authenticated identity
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256, Algorithm::ES256, Algorithm::PS256]
}

fn default_org_claim() -> String {
    DEFAULT_ORG_CLAIM.to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string()]
}

impl VerifierConfig {
    /// Configuration for an issuer with every other setting at its default
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: None,
            jwks_uri: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            clock_skew_secs: 0,
            algorithms: default_algorithms(),
            org_claim: default_org_claim(),
            scopes: default_scopes(),
        }
    }

    /// Configuration for an AWS Cognito user pool
    ///
    /// The issuer is `https://cognito-idp.{region}.amazonaws.com/{pool_id}`;
    /// Cognito publishes its keys at the default well-known path.
    pub fn cognito(region: &str, pool_id: &str) -> Self {
        Self::new(format!(
            "https://cognito-idp.{region}.amazonaws.com/{pool_id}"
        ))
    }

    /// Require this audience (ignored when empty)
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Fetch keys from this URL instead of the issuer's well-known path
    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    /// Set the key-set cache TTL
    ///
    /// Rounded up to whole seconds. Zero re-fetches the key set on every
    /// verification.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = whole_secs(ttl);
        self
    }

    /// Set the per-fetch timeout, rounded up to whole seconds
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_secs = whole_secs(timeout);
        self
    }

    /// Accept `exp` and `nbf` up to this far off, rounded up to whole seconds
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew_secs = whole_secs(leeway);
        self
    }

    /// Set accepted algorithms
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Read the organization identifier from a different claim
    pub fn with_org_claim(mut self, claim: impl Into<String>) -> Self {
        self.org_claim = claim.into();
        self
    }

    /// Effective key-set URL
    pub fn key_source_url(&self) -> String {
        match &self.jwks_uri {
            Some(uri) if !uri.is_empty() => uri.clone(),
            _ => format!(
                "{}{}",
                self.issuer.trim_end_matches('/'),
                JWKS_WELL_KNOWN_PATH
            ),
        }
    }

    /// Audience to enforce, if any
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref().filter(|aud| !aud.is_empty())
    }

    /// Key-set cache TTL
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Per-fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Clock skew tolerance
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Check the configuration before building a verifier
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not an absolute URL, the key-set URL
    /// is not absolute or uses plain HTTP on a non-loopback host, the fetch
    /// timeout is zero, or the algorithm list is empty or contains a
    /// symmetric algorithm.
    pub fn validate(&self) -> AuthResult<()> {
        parse_absolute_url("issuer", &self.issuer)?;
        check_key_source_url(&self.key_source_url())?;

        if self.fetch_timeout_secs == 0 {
            return Err(AuthError::InvalidConfig(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.algorithms.is_empty() {
            return Err(AuthError::InvalidConfig(
                "at least one signing algorithm is required".to_string(),
            ));
        }
        if self.algorithms.iter().any(|alg| {
            matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
        }) {
            return Err(AuthError::InvalidConfig(
                "symmetric algorithms cannot be verified against a public key set".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from `TOOLGATE_AUTH_*` environment variables
    ///
    /// `TOOLGATE_AUTH_ISSUER` is required. List settings take comma-separated
    /// values (`TOOLGATE_AUTH_SCOPES=openid,profile`).
    ///
    /// # Errors
    ///
    /// Returns an error if the environment does not deserialize into a
    /// configuration or the result fails [`VerifierConfig::validate`].
    pub fn from_env() -> AuthResult<Self> {
        Self::load(None, ENV_PREFIX)
    }

    /// Load from a file, with `TOOLGATE_AUTH_*` environment overrides
    ///
    /// The format follows the extension (`.toml`, `.yaml`/`.yml`, `.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, does not
    /// deserialize, or the result fails [`VerifierConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        Self::load(Some(path.as_ref()), ENV_PREFIX)
    }

    /// Load from an optional file plus environment variables under `env_prefix`
    ///
    /// # Errors
    ///
    /// See [`VerifierConfig::from_file`].
    pub fn load(path: Option<&Path>, env_prefix: &str) -> AuthResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("algorithms")
                    .with_list_parse_key("scopes"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse `value` as an absolute URL
pub(crate) fn parse_absolute_url(field: &'static str, value: &str) -> AuthResult<Url> {
    if value.is_empty() {
        return Err(AuthError::InvalidUrl {
            field,
            reason: "empty".to_string(),
        });
    }
    let url = Url::parse(value).map_err(|e| AuthError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || url.host().is_none() {
        return Err(AuthError::InvalidUrl {
            field,
            reason: "not an absolute URL with a host".to_string(),
        });
    }
    Ok(url)
}

/// Key sources must be HTTPS, except on loopback hosts
pub(crate) fn check_key_source_url(value: &str) -> AuthResult<Url> {
    let url = parse_absolute_url("jwks_uri", value)?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        _ => Err(AuthError::InsecureKeySource(url.to_string())),
    }
}

fn whole_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
