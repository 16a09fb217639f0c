//! JWKS (JSON Web Key Set) fetching and caching
//!
//! Keys are fetched lazily on first use and kept until a token names a key
//! id the cached set does not contain. That triggers one refresh:
//!
//! - **Single flight**: a mutex serializes refreshes, and waiters re-check
//!   the cache before fetching, so a burst of unknown-kid tokens costs one
//!   request
//! - **Rate limiting**: at most one refresh per `min_refresh_interval`. A
//!   refresh spent on a bogus key id counts too, so a key rotated in right
//!   after it is rejected until the interval has passed
//! - **Retries**: transport errors and 5xx responses are retried with
//!   exponential backoff; 4xx and malformed bodies fail immediately
//!
//! # Security Considerations
//!
//! - HTTPS required for JWKS endpoints, except `localhost` and `127.0.0.1`
//! - Requests time out (default 10 seconds)

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::{StatusCode, Url};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{SecurityError, SecurityResult};

/// Default HTTP timeout for JWKS requests
pub const DEFAULT_JWKS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of fetch attempts
pub const DEFAULT_JWKS_ATTEMPTS: u32 = 3;

/// Retry policy for JWKS fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Fixed interval between attempts
    Fixed {
        /// Time between attempts
        interval: Duration,
        /// Total attempts, including the first
        max_attempts: u32,
    },
    /// Exponential backoff
    Exponential {
        /// Delay before the first retry; doubled for each further retry
        base: Duration,
        /// Upper bound for a single delay
        max_delay: Duration,
        /// Total attempts, including the first
        max_attempts: u32,
    },
    /// Single attempt
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_JWKS_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Exponential backoff starting at 100ms, capped at 2s
    pub fn exponential(max_attempts: u32) -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_attempts,
        }
    }

    /// Delay before retry number `retry` (0-based), or `None` when the
    /// attempts are used up
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_attempts,
            } => (retry.saturating_add(1) < *max_attempts).then_some(*interval),
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if retry.saturating_add(1) >= *max_attempts {
                    return None;
                }
                let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
                Some(base.saturating_mul(factor).min(*max_delay))
            }
            Self::Never => None,
        }
    }
}

/// Outcome of a single fetch attempt
enum FetchError {
    /// Worth another attempt (transport failure, 5xx)
    Transient(String),
    /// Retrying will not help (4xx, bad body)
    Permanent(String),
}

/// Builder for [`JwksClient`]
#[derive(Debug, Clone)]
pub struct JwksClientBuilder {
    jwks_uri: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
    min_refresh_interval: Duration,
}

impl JwksClientBuilder {
    /// HTTP timeout per request
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy for failed fetches
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Minimum time between two refreshes
    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Configuration`] if the URL is invalid or not
    /// HTTPS (plain HTTP is allowed for `localhost` and `127.0.0.1`), or if
    /// the HTTP client cannot be created.
    pub fn build(self) -> SecurityResult<JwksClient> {
        validate_jwks_uri(&self.jwks_uri)?;

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SecurityError::Configuration(format!("HTTP client: {e}")))?;

        Ok(JwksClient {
            jwks_uri: self.jwks_uri,
            keys: Arc::new(RwLock::new(None)),
            http_client,
            retry_policy: self.retry_policy,
            min_refresh_interval: self.min_refresh_interval,
            last_refresh: Arc::new(Mutex::new(None)),
        })
    }
}

fn validate_jwks_uri(jwks_uri: &str) -> SecurityResult<()> {
    let url = Url::parse(jwks_uri)
        .map_err(|e| SecurityError::Configuration(format!("invalid JWKS URL '{jwks_uri}': {e}")))?;

    let local = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));
    match url.scheme() {
        "https" => Ok(()),
        "http" if local => Ok(()),
        _ => Err(SecurityError::Configuration(
            "JWKS endpoint must use HTTPS (HTTP only allowed for localhost)".to_string(),
        )),
    }
}

/// JWKS client for fetching and caching JSON Web Key Sets
///
/// Clones share the cached key set and the refresh lock.
///
/// # Example
///
/// ```rust,no_run
/// # use tokenward_auth::jwt::JwksClient;
/// # tokio_test::block_on(async {
/// let client = JwksClient::builder("https://auth.example.com/.well-known/jwks.json").build()?;
/// let key = client.decoding_key("key-id-123").await?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct JwksClient {
    jwks_uri: String,
    keys: Arc<RwLock<Option<JwkSet>>>,
    http_client: reqwest::Client,
    retry_policy: RetryPolicy,
    min_refresh_interval: Duration,
    /// Held for the whole refresh; stores when the last one succeeded
    last_refresh: Arc<Mutex<Option<Instant>>>,
}

impl JwksClient {
    /// Start building a client for `jwks_uri`
    ///
    /// Defaults: 10 second timeout, 3 attempts with exponential backoff,
    /// one refresh per 5 seconds at most.
    pub fn builder(jwks_uri: impl Into<String>) -> JwksClientBuilder {
        JwksClientBuilder {
            jwks_uri: jwks_uri.into(),
            timeout: DEFAULT_JWKS_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            min_refresh_interval: Duration::from_secs(5),
        }
    }

    /// The JWKS endpoint URI
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Key ids currently cached
    pub async fn cached_key_ids(&self) -> Vec<String> {
        self.keys
            .read()
            .await
            .as_ref()
            .map(|set| set.keys.iter().filter_map(|jwk| jwk.common.key_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Resolve the verification key for `kid`
    ///
    /// Refreshes the key set once if `kid` is not cached.
    ///
    /// # Errors
    ///
    /// - [`SecurityError::KeySetUnavailable`] if the key set cannot be fetched
    /// - [`SecurityError::TokenKeyInvalid`] if no usable key has this id
    pub async fn decoding_key(&self, kid: &str) -> SecurityResult<DecodingKey> {
        let jwk = match self.cached(kid).await {
            Some(jwk) => jwk,
            None => self.refresh_for(kid).await?,
        };

        DecodingKey::from_jwk(&jwk)
            .map_err(|e| SecurityError::TokenKeyInvalid(format!("key '{kid}' is unusable: {e}")))
    }

    /// Fetch the key set now, ignoring the rate limit
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::KeySetUnavailable`] if the fetch fails.
    pub async fn refresh(&self) -> SecurityResult<usize> {
        let mut last_refresh = self.last_refresh.lock().await;
        let set = self.fetch_with_retry().await?;
        let count = set.keys.len();
        *self.keys.write().await = Some(set);
        *last_refresh = Some(Instant::now());
        Ok(count)
    }

    /// Drop the cached key set
    pub async fn clear_cache(&self) {
        *self.keys.write().await = None;
        debug!(jwks_uri = %self.jwks_uri, "JWKS cache cleared");
    }

    async fn cached(&self, kid: &str) -> Option<Jwk> {
        self.keys.read().await.as_ref()?.find(kid).cloned()
    }

    async fn refresh_for(&self, kid: &str) -> SecurityResult<Jwk> {
        let mut last_refresh = self.last_refresh.lock().await;

        // Whoever held the lock before us may already have fetched the key
        if let Some(jwk) = self.cached(kid).await {
            return Ok(jwk);
        }

        if let Some(last) = *last_refresh
            && last.elapsed() < self.min_refresh_interval
        {
            warn!(
                jwks_uri = %self.jwks_uri,
                kid,
                since_last_ms = last.elapsed().as_millis(),
                "JWKS refresh rate limited"
            );
            return Err(unknown_kid(kid));
        }

        let set = self.fetch_with_retry().await?;
        let found = set.find(kid).cloned();
        *self.keys.write().await = Some(set);
        *last_refresh = Some(Instant::now());

        found.ok_or_else(|| {
            warn!(jwks_uri = %self.jwks_uri, kid, "Key id not found after refresh");
            unknown_kid(kid)
        })
    }

    async fn fetch_with_retry(&self) -> SecurityResult<JwkSet> {
        let mut retry = 0;
        loop {
            match self.fetch().await {
                Ok(set) => return Ok(set),
                Err(FetchError::Permanent(reason)) => {
                    error!(jwks_uri = %self.jwks_uri, reason = %reason, "JWKS fetch failed");
                    return Err(SecurityError::KeySetUnavailable(reason));
                }
                Err(FetchError::Transient(reason)) => match self.retry_policy.delay(retry) {
                    Some(delay) => {
                        warn!(
                            jwks_uri = %self.jwks_uri,
                            reason = %reason,
                            attempt = retry + 1,
                            delay_ms = delay.as_millis(),
                            "JWKS fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    None => {
                        error!(
                            jwks_uri = %self.jwks_uri,
                            reason = %reason,
                            attempts = retry + 1,
                            "JWKS fetch failed, giving up"
                        );
                        return Err(SecurityError::KeySetUnavailable(reason));
                    }
                },
            }
        }
    }

    async fn fetch(&self) -> Result<JwkSet, FetchError> {
        info!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("JWKS request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::Transient(format!(
                "JWKS endpoint returned status {status}"
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Permanent(format!(
                "JWKS endpoint returned status {status}"
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| FetchError::Permanent(format!("Invalid JWKS format: {e}")))?;

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = set.keys.len(),
            "Successfully fetched JWKS"
        );
        Ok(set)
    }
}

fn unknown_kid(kid: &str) -> SecurityError {
    SecurityError::TokenKeyInvalid(format!("no key with id '{kid}' in the key set"))
}
