//! Key-set (JWKS) fetching and caching
//!
//! - **TTL-based caching**: a fetched key set is served until it is older
//!   than the TTL (default one hour), then re-fetched on the next request.
//! - **Lock-free reads**: the current state lives behind an `ArcSwapOption`,
//!   so serving a fresh key set never waits on the refresh lock.
//! - **Single-flight refresh**: fetch-and-install runs under an async mutex.
//!   A caller that waited on the mutex while someone else installed a newer
//!   key set gets that key set instead of fetching again.
//! - **No stale fallback**: a failed fetch leaves the previous state in place
//!   and reports the failure; the caller decides what to do.
//!
//! A fetch runs inside the caller's future. Dropping that future (request
//! cancelled, caller timeout) abandons the HTTP request and releases the
//! refresh lock without touching the cache.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::check_key_source_url;
use crate::error::AuthResult;

/// Why a key-set fetch failed
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or protocol failure
    #[error("request to key source failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The key source did not answer in time
    #[error("key source timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx response
    #[error("key source returned status {0}")]
    Status(reqwest::StatusCode),

    /// Body was not a JSON Web Key Set
    #[error("key source returned an invalid key set: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Where key sets come from
///
/// The production implementation is [`HttpKeySource`]; tests substitute
/// in-memory sources.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the complete current key set
    async fn fetch(&self) -> Result<JwkSet, FetchError>;

    /// Where keys are fetched from, for logs
    fn location(&self) -> &str;
}

/// Fetches a JWKS document with an HTTP GET
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    jwks_uri: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a key source for `jwks_uri`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not absolute, uses plain HTTP on a
    /// non-loopback host, or the HTTP client cannot be built.
    pub fn new(jwks_uri: impl Into<String>, timeout: Duration) -> AuthResult<Self> {
        let jwks_uri = jwks_uri.into();
        check_key_source_url(&jwks_uri)?;

        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            jwks_uri,
            timeout,
            http_client,
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, FetchError> {
        let response = self
            .http_client
            .get(&self.jwks_uri)
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Request(e)
            }
        })?;

        Ok(serde_json::from_slice(&body)?)
    }

    fn location(&self) -> &str {
        &self.jwks_uri
    }
}

/// An immutable, shareable key set
///
/// Cloning is a reference-count increment; a refresh installs a new set
/// rather than mutating this one.
#[derive(Debug, Clone)]
pub struct KeySet {
    jwks: Arc<JwkSet>,
    generation: u64,
}

impl KeySet {
    /// Install generation this set came from; 0 when built outside a cache
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Key with this identifier, if present
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.jwks.find(kid)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.jwks.keys.len()
    }

    /// Whether the set has no keys
    pub fn is_empty(&self) -> bool {
        self.jwks.keys.is_empty()
    }

    /// Identifiers of the keys that carry one
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.jwks
            .keys
            .iter()
            .filter_map(|jwk| jwk.common.key_id.as_deref())
    }
}

impl From<JwkSet> for KeySet {
    fn from(jwks: JwkSet) -> Self {
        Self {
            jwks: Arc::new(jwks),
            generation: 0,
        }
    }
}

/// Installed cache state; replaced as a whole, never mutated
#[derive(Debug)]
struct CachedKeySet {
    keys: KeySet,
    fetched_at: Instant,
}

impl CachedKeySet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Default key-set TTL
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Caches the key set of one key source
///
/// # Example
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use toolgate_auth::jwt::{HttpKeySource, KeySetCache};
/// # tokio_test::block_on(async {
/// let source = HttpKeySource::new(
///     "https://issuer.example/pool/.well-known/jwks.json",
///     Duration::from_secs(10),
/// )?;
/// let cache = KeySetCache::new(source);
///
/// // First call fetches, later calls inside the TTL are served from memory
/// let keys = cache.get_current().await?;
/// if let Some(key) = keys.find("key-id-123") {
///     // verify with key
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
pub struct KeySetCache<S = HttpKeySource> {
    source: S,
    ttl: Duration,
    state: ArcSwapOption<CachedKeySet>,
    /// Serializes fetch-and-install; holds the number of installs so far
    refresh_lock: Mutex<u64>,
}

impl<S> fmt::Debug for KeySetCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load();
        f.debug_struct("KeySetCache")
            .field("ttl", &self.ttl)
            .field("key_count", &state.as_ref().map(|c| c.keys.len()))
            .field("generation", &state.as_ref().map(|c| c.keys.generation))
            .finish_non_exhaustive()
    }
}

impl<S: KeySource> KeySetCache<S> {
    /// Create an empty cache with the default one-hour TTL
    pub fn new(source: S) -> Self {
        Self::with_ttl(source, DEFAULT_CACHE_TTL)
    }

    /// Create an empty cache with a custom TTL
    pub fn with_ttl(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(0),
        }
    }

    /// Current key set, fetching it if missing or stale
    ///
    /// # Errors
    ///
    /// Returns the fetch error when a fetch was needed and failed. The
    /// previously cached key set, if any, stays installed.
    pub async fn get_current(&self) -> Result<KeySet, FetchError> {
        let observed = self.state.load_full();
        if let Some(cached) = observed.as_deref()
            && cached.is_fresh(self.ttl)
        {
            debug!(
                jwks_uri = %self.source.location(),
                generation = cached.keys.generation,
                "Using cached key set"
            );
            return Ok(cached.keys.clone());
        }

        self.fetch_and_install(observed.map(|c| c.keys.generation)).await
    }

    /// Fetch a new key set regardless of freshness
    ///
    /// Used after a token names a key identifier the cached set does not
    /// contain (the issuer may have rotated keys).
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previously cached key set stays
    /// installed.
    pub async fn force_refresh(&self) -> Result<KeySet, FetchError> {
        let observed = self.installed_generation();
        self.fetch_and_install(observed).await
    }

    /// Replace the key set of generation `stale`
    ///
    /// If a newer generation is already installed (another caller refreshed
    /// after `stale` was read), that set is returned without fetching.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previously cached key set stays
    /// installed.
    pub async fn force_refresh_after(&self, stale: u64) -> Result<KeySet, FetchError> {
        self.fetch_and_install(Some(stale)).await
    }

    async fn fetch_and_install(&self, observed: Option<u64>) -> Result<KeySet, FetchError> {
        let mut installs = self.refresh_lock.lock().await;

        // Someone installed a newer key set while we waited for the lock
        if let Some(current) = self.state.load_full()
            && Some(current.keys.generation) != observed
        {
            debug!(
                jwks_uri = %self.source.location(),
                generation = current.keys.generation,
                "Reusing key set installed by a concurrent refresh"
            );
            return Ok(current.keys.clone());
        }

        info!(jwks_uri = %self.source.location(), "Fetching key set");

        let jwks = self.source.fetch().await.map_err(|e| {
            warn!(jwks_uri = %self.source.location(), error = %e, "Key set fetch failed");
            e
        })?;

        *installs += 1;
        let keys = KeySet {
            jwks: Arc::new(jwks),
            generation: *installs,
        };
        self.state.store(Some(Arc::new(CachedKeySet {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        })));

        info!(
            jwks_uri = %self.source.location(),
            key_count = keys.len(),
            generation = *installs,
            "Installed key set"
        );

        Ok(keys)
    }

    /// Whether a key set is cached and younger than the TTL
    pub fn is_fresh(&self) -> bool {
        self.state
            .load()
            .as_ref()
            .is_some_and(|cached| cached.is_fresh(self.ttl))
    }

    /// Generation of the installed key set; increments on every install
    pub fn installed_generation(&self) -> Option<u64> {
        self.state.load().as_ref().map(|cached| cached.keys.generation)
    }

    /// Drop the cached key set; the next `get_current` fetches
    pub fn clear(&self) {
        self.state.store(None);
        debug!(jwks_uri = %self.source.location(), "Key set cache cleared");
    }

    /// Cache TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The underlying key source
    pub fn key_source(&self) -> &S {
        &self.source
    }
}
