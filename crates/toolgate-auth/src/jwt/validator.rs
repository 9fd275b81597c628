//! Bearer-token verification against a cached key set
//!
//! Verification of one token:
//! - Fetch the current key set (cached, see [`super::jwks`])
//! - Parse header and payload; reject tokens outside the time window
//! - Check the header algorithm against the allow-list and require a `kid`
//! - Look up the key; an unknown `kid` triggers exactly one forced refresh
//!   and one more attempt (the issuer may have rotated its keys)
//! - Verify the signature, then `iss`, optional `aud` and `sub`
//!
//! Every failure is classified as a [`FailureReason`] and logged with its
//! detail. The outcome carries the reason only, never the detail.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use tracing::{debug, warn};

use super::jwks::{HttpKeySource, KeySet, KeySetCache, KeySource};
use super::{StandardClaims, TokenClaims};
use crate::config::VerifierConfig;
use crate::context::{AuthContext, TokenAuthenticator};
use crate::error::{AuthResult, FailureReason};

/// Lifetime assumed for a token that carries no `exp`
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Result of verifying one token
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// Signature and claims check out
    Success {
        /// Verified claims
        claims: TokenClaims,
        /// The input token, byte for byte
        raw_token: String,
    },
    /// Rejected; the reason is for logs and metrics, not for callers
    Failure(FailureReason),
}

impl VerificationOutcome {
    /// Whether the token was accepted
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The rejection reason, if any
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(reason) => Some(*reason),
        }
    }

    /// Convert into a `Result` of (claims, raw token)
    ///
    /// # Errors
    ///
    /// Returns the failure reason for a rejected token.
    pub fn into_result(self) -> Result<(TokenClaims, String), FailureReason> {
        match self {
            Self::Success { claims, raw_token } => Ok((claims, raw_token)),
            Self::Failure(reason) => Err(reason),
        }
    }
}

/// One pass over a key set
enum Attempt {
    Verified(TokenClaims),
    /// The token names a key the set does not contain
    Retryable(String),
    Terminal(FailureReason, String),
}

/// Verifies bearer tokens issued by one issuer
///
/// Cheap to share behind an `Arc`; concurrent calls to
/// [`verify`](Self::verify) share the key-set cache and at most one key-set
/// fetch is in flight at a time.
///
/// # Example
///
/// ```rust,no_run
/// # use toolgate_auth::{TokenVerifier, VerifierConfig};
/// # tokio_test::block_on(async {
/// let config = VerifierConfig::new("https://issuer.example/pool")
///     .with_audience("my-client-id");
/// let verifier = TokenVerifier::new(config)?;
///
/// let outcome = verifier.verify("eyJhbGciOiJSUzI1NiIs...", None).await;
/// if let Ok((claims, _raw)) = outcome.into_result() {
///     println!("authenticated {}", claims.subject);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct TokenVerifier<S = HttpKeySource> {
    config: VerifierConfig,
    cache: Arc<KeySetCache<S>>,
}

impl<S> fmt::Debug for TokenVerifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("algorithms", &self.config.algorithms)
            .field("cache", &self.cache)
            .finish()
    }
}

impl TokenVerifier<HttpKeySource> {
    /// Build a verifier that fetches keys over HTTP
    ///
    /// No network traffic happens here; the key set is fetched on the first
    /// verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails
    /// [`VerifierConfig::validate`] or the HTTP client cannot be built.
    pub fn new(config: VerifierConfig) -> AuthResult<Self> {
        config.validate()?;
        let source = HttpKeySource::new(config.key_source_url(), config.fetch_timeout())?;
        Self::with_key_source(config, source)
    }
}

impl<S: KeySource> TokenVerifier<S> {
    /// Build a verifier over a custom key source
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails
    /// [`VerifierConfig::validate`].
    pub fn with_key_source(config: VerifierConfig, source: S) -> AuthResult<Self> {
        config.validate()?;
        let cache = Arc::new(KeySetCache::with_ttl(source, config.cache_ttl()));
        Ok(Self { config, cache })
    }

    /// Build a verifier over an existing (possibly shared) cache
    ///
    /// The cache keeps its own TTL; `config.cache_ttl_secs` is not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails
    /// [`VerifierConfig::validate`].
    pub fn with_cache(config: VerifierConfig, cache: Arc<KeySetCache<S>>) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self { config, cache })
    }

    /// Configured issuer, as advertised in discovery metadata
    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    /// Verifier configuration
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// The key-set cache
    pub fn cache(&self) -> &Arc<KeySetCache<S>> {
        &self.cache
    }

    /// Verify a bearer token
    ///
    /// `request` is the inbound request the token arrived on. The default
    /// verifier does not inspect it.
    pub async fn verify(
        &self,
        token: &str,
        _request: Option<&http::request::Parts>,
    ) -> VerificationOutcome {
        let keys = match self.cache.get_current().await {
            Ok(keys) => keys,
            Err(e) => return self.fail(FailureReason::KeySourceUnreachable, &e),
        };

        let attempt = match self.attempt(token, &keys) {
            Attempt::Retryable(kid) => {
                debug!(kid = %kid, "Key ID not in cached key set, refreshing");
                let keys = match self.cache.force_refresh_after(keys.generation()).await {
                    Ok(keys) => keys,
                    Err(e) => return self.fail(FailureReason::KeySourceUnreachable, &e),
                };
                self.attempt(token, &keys)
            }
            other => other,
        };

        match attempt {
            Attempt::Verified(claims) => {
                debug!(subject = %claims.subject, "Bearer token verified");
                VerificationOutcome::Success {
                    claims,
                    raw_token: token.to_string(),
                }
            }
            Attempt::Terminal(reason, detail) => self.fail(reason, &detail),
            // Still unknown after the one refresh
            Attempt::Retryable(kid) => self.fail(
                FailureReason::SignatureInvalid,
                &format_args!("key ID {kid} not found after key set refresh"),
            ),
        }
    }

    fn fail(&self, reason: FailureReason, detail: &dyn fmt::Display) -> VerificationOutcome {
        match reason {
            FailureReason::KeySourceUnreachable => warn!(
                reason = %reason,
                jwks_uri = %self.cache.key_source().location(),
                error = %detail,
                "Bearer token verification failed"
            ),
            _ => debug!(reason = %reason, error = %detail, "Bearer token verification failed"),
        }
        VerificationOutcome::Failure(reason)
    }

    fn attempt(&self, token: &str, keys: &KeySet) -> Attempt {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                return Attempt::Terminal(
                    FailureReason::MalformedToken,
                    format!("invalid header: {e}"),
                );
            }
        };

        let unverified = match decode_payload(token) {
            Ok(claims) => claims,
            Err(detail) => return Attempt::Terminal(FailureReason::MalformedToken, detail),
        };

        let now = unix_now();
        let leeway = self.config.clock_skew_secs;
        if let Some(exp) = unverified.exp
            && now >= exp.saturating_add(leeway)
        {
            return Attempt::Terminal(
                FailureReason::TokenExpired,
                format!("expired at {exp}, now {now}"),
            );
        }
        if let Some(nbf) = unverified.nbf
            && nbf > now.saturating_add(leeway)
        {
            return Attempt::Terminal(
                FailureReason::TokenExpired,
                format!("not valid before {nbf}, now {now}"),
            );
        }

        if !self.config.algorithms.contains(&header.alg) {
            return Attempt::Terminal(
                FailureReason::SignatureInvalid,
                format!("algorithm {:?} not allowed", header.alg),
            );
        }

        let Some(kid) = header.kid else {
            return Attempt::Terminal(
                FailureReason::SignatureInvalid,
                "token header has no key ID".to_string(),
            );
        };

        let Some(jwk) = keys.find(&kid) else {
            return Attempt::Retryable(kid);
        };

        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(e) => {
                return Attempt::Terminal(
                    FailureReason::SignatureInvalid,
                    format!("unusable key {kid}: {e}"),
                );
            }
        };

        // Time window was checked above; decode only verifies the signature.
        // The validation must list the header algorithm alone, since every
        // listed algorithm has to match the key family.
        let mut validation = Validation::new(header.alg);
        validation.leeway = leeway;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let claims = match decode::<StandardClaims>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => FailureReason::MalformedToken,
                    _ => FailureReason::SignatureInvalid,
                };
                return Attempt::Terminal(reason, format!("key {kid}: {e}"));
            }
        };

        self.check_claims(claims, now)
    }

    fn check_claims(&self, claims: StandardClaims, now: u64) -> Attempt {
        let issuer = match claims.iss.as_deref() {
            Some(iss) if iss == self.config.issuer => iss.to_string(),
            other => {
                return Attempt::Terminal(
                    FailureReason::IssuerMismatch,
                    format!("iss {other:?}, expected {}", self.config.issuer),
                );
            }
        };

        if let Some(expected) = self.config.audience()
            && !claims.aud.as_ref().is_some_and(|aud| aud.contains(expected))
        {
            return Attempt::Terminal(
                FailureReason::AudienceMismatch,
                format!("aud {:?}, expected {expected}", claims.aud),
            );
        }

        let subject = match claims.sub.as_deref() {
            Some(sub) if !sub.is_empty() => sub.to_string(),
            _ => {
                return Attempt::Terminal(
                    FailureReason::MalformedToken,
                    "missing or empty sub".to_string(),
                );
            }
        };

        let expires_at = match claims.exp {
            Some(exp) => UNIX_EPOCH.checked_add(Duration::from_secs(exp)),
            None => UNIX_EPOCH.checked_add(Duration::from_secs(now) + DEFAULT_TOKEN_LIFETIME),
        };
        let Some(expires_at) = expires_at else {
            return Attempt::Terminal(
                FailureReason::MalformedToken,
                format!("exp {:?} out of range", claims.exp),
            );
        };

        Attempt::Verified(TokenClaims::from_standard(
            subject, issuer, expires_at, claims,
        ))
    }
}

#[async_trait]
impl<S: KeySource> TokenAuthenticator for TokenVerifier<S> {
    async fn authenticate(
        &self,
        token: &str,
        request: Option<&http::request::Parts>,
    ) -> Result<AuthContext, FailureReason> {
        let (claims, raw_token) = self.verify(token, request).await.into_result()?;
        Ok(AuthContext::from_claims(
            claims,
            raw_token,
            &self.config.org_claim,
            &self.config.scopes,
        ))
    }
}

/// Decode the payload without verifying the signature
fn decode_payload(token: &str) -> Result<StandardClaims, String> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("token does not have three segments".to_string());
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| format!("payload is not base64url: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("payload is not a claims object: {e}"))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
