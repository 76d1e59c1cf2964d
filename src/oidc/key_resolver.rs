//! Signing key resolution with a shared, coalescing JWKS cache

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::config::{PolicyConfig, DEFAULT_JWKS_MIN_REFRESH_INTERVAL};
use crate::error::{AuthorizerError, Result};
use super::types::{SignatureAlgorithm, SigningKeySet};

/// Where JWKS documents come from.
///
/// Implementations perform one fetch per call and do not cache.
#[async_trait]
pub trait JwksSource: Send + Sync {
    async fn fetch_jwks(&self) -> Result<Value>;
}

/// Fetches the JWKS document over HTTPS
#[derive(Clone)]
pub struct HttpJwksSource {
    http_client: Client,
    jwks_uri: String,
}

impl HttpJwksSource {
    /// HTTPS-only client with the given request timeout
    pub fn new(jwks_uri: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .https_only(true)
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorizerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(jwks_uri, http_client))
    }

    /// Use a caller-supplied client as is
    pub fn with_client(jwks_uri: impl Into<String>, http_client: Client) -> Self {
        Self {
            http_client,
            jwks_uri: jwks_uri.into(),
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }
}

#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch_jwks(&self) -> Result<Value> {
        tracing::debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AuthorizerError::KeyFetchFailed(format!("Failed to fetch JWKS: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthorizerError::KeyFetchFailed(format!(
                "JWKS fetch failed with status: {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AuthorizerError::KeyFetchFailed(format!("Failed to parse JWKS: {}", e)))
    }
}

struct CachedKeySet {
    keys: Arc<SigningKeySet>,
    fetched_at: Instant,
    generation: u64,
    /// Set when this set was fetched because of an unknown `kid`
    forced_at: Option<Instant>,
}

impl CachedKeySet {
    fn recently_forced(&self, min_interval: Duration) -> bool {
        self.forced_at.is_some_and(|at| at.elapsed() < min_interval)
    }
}

/// Resolves a token's `kid` to the issuer's public key.
///
/// The fetched [`SigningKeySet`] is shared by all callers and replaced
/// wholesale on refresh. A lookup miss on a fresh set forces one refetch
/// to pick up rotated keys, unless the set itself came from such a refetch
/// less than the minimum refresh interval ago. Concurrent refreshes of the
/// same generation collapse into a single fetch.
pub struct KeyResolver {
    source: Arc<dyn JwksSource>,
    algorithm: SignatureAlgorithm,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    min_refresh_interval: Duration,
    state: RwLock<Option<CachedKeySet>>,
    refresh_lock: Mutex<()>,
}

impl KeyResolver {
    pub fn new(source: Arc<dyn JwksSource>, cache_ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source,
            algorithm: SignatureAlgorithm::default(),
            cache_ttl,
            fetch_timeout,
            min_refresh_interval: DEFAULT_JWKS_MIN_REFRESH_INTERVAL,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolver over the configured HTTPS endpoint
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let source = HttpJwksSource::new(config.jwks_url.clone(), config.jwks_fetch_timeout)?;
        Ok(Self::with_source(Arc::new(source), config))
    }

    /// Resolver over any source, with cache settings from `config`
    pub fn with_source(source: Arc<dyn JwksSource>, config: &PolicyConfig) -> Self {
        Self::new(source, config.jwks_cache_ttl, config.jwks_fetch_timeout)
            .with_min_refresh_interval(config.jwks_min_refresh_interval)
    }

    /// Minimum spacing between refetches forced by unknown `kid`s; zero
    /// refetches on every miss.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Return the key for `kid`.
    ///
    /// # Errors
    ///
    /// - [`AuthorizerError::KeyFetchFailed`] if a needed fetch fails or times out
    /// - [`AuthorizerError::KeyNotFound`] if `kid` is absent after a refresh
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<DecodingKey>> {
        let (observed_generation, forced) = {
            let state = self.state.read().await;
            match state.as_ref() {
                Some(cached) if cached.fetched_at.elapsed() < self.cache_ttl => {
                    if let Some(key) = cached.keys.get(kid) {
                        return Ok(key);
                    }
                    if cached.recently_forced(self.min_refresh_interval) {
                        tracing::debug!("kid not in recently refetched key set");
                        return Err(AuthorizerError::KeyNotFound { kid: kid.to_string() });
                    }
                    tracing::debug!("kid not in cached key set, forcing refresh");
                    (cached.generation, true)
                }
                Some(cached) => {
                    tracing::debug!("cached key set expired");
                    (cached.generation, false)
                }
                None => (0, false),
            }
        };

        let keys = self.refresh(observed_generation, forced).await?;
        keys.get(kid).ok_or_else(|| AuthorizerError::KeyNotFound { kid: kid.to_string() })
    }

    /// Replace the cached set unless another caller already replaced
    /// `observed_generation`, in which case that newer set is returned.
    async fn refresh(&self, observed_generation: u64, forced: bool) -> Result<Arc<SigningKeySet>> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(cached) = self.state.read().await.as_ref() {
            if cached.generation != observed_generation {
                tracing::debug!(generation = cached.generation, "reusing concurrently refreshed key set");
                return Ok(cached.keys.clone());
            }
        }

        let document = tokio::time::timeout(self.fetch_timeout, self.source.fetch_jwks())
            .await
            .unwrap_or_else(|_| {
                Err(AuthorizerError::KeyFetchFailed(format!(
                    "JWKS fetch timed out after {}ms",
                    self.fetch_timeout.as_millis()
                )))
            })
            .inspect_err(|e| tracing::warn!(error = %e, "JWKS fetch failed"))?;

        let keys = Arc::new(SigningKeySet::from_jwks_document(&document, self.algorithm)?);
        let generation = observed_generation + 1;
        tracing::debug!(generation, key_count = keys.len(), "installed signing key set");

        *self.state.write().await = Some(CachedKeySet {
            keys: keys.clone(),
            fetched_at: Instant::now(),
            generation,
            forced_at: forced.then(Instant::now),
        });

        Ok(keys)
    }

    /// Number of key sets installed so far
    pub async fn generation(&self) -> u64 {
        self.state.read().await.as_ref().map_or(0, |cached| cached.generation)
    }
}
