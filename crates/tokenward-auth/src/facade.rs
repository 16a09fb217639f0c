//! Security facade - the single entry point for token checks and identities
//!
//! The facade owns one [`TokenStrategy`], chosen once from
//! [`SecuritySettings`] when it is built, plus the identity resolver.
//!
//! ```text
//! token ─▶ TokenStrategy ─▶ Claims ─▶ SessionGuard ─▶ IdentityCache ─▶ Arc<Identity>
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::claims::Claims;
use crate::clock::{Clock, SystemClock};
use crate::config::{SecuritySettings, StrategyKind};
use crate::error::{SecurityError, SecurityResult};
use crate::identity::{IdentityCache, IdentityResolver, ResolverOptions};
use crate::jwt::{HmacKey, JwksClient, LocalTokenCodec, RemoteTokenValidator};
use crate::server::token_from_headers;
use crate::session::SessionGuard;
use crate::store::IdentityStore;
use crate::types::Identity;

/// How tokens are validated
#[derive(Debug, Clone)]
pub enum TokenStrategy {
    /// Self-issued HS512 tokens
    Local(LocalTokenCodec),
    /// RS256 tokens from an identity provider
    Remote(RemoteTokenValidator),
}

impl TokenStrategy {
    /// Which kind of strategy this is
    pub fn kind(&self) -> StrategyKind {
        match self {
            TokenStrategy::Local(_) => StrategyKind::Local,
            TokenStrategy::Remote(_) => StrategyKind::Remote,
        }
    }
}

/// Outcome of a token check
#[derive(Debug, Clone, PartialEq)]
pub enum TokenCheck {
    /// Token checking is switched off
    Disabled,
    /// The token was presented and rejected
    Rejected(SecurityError),
    /// The token verified
    Accepted(Claims),
}

impl TokenCheck {
    /// Verified claims, if accepted
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            TokenCheck::Accepted(claims) => Some(claims),
            _ => None,
        }
    }

    /// Whether the token verified
    pub fn is_accepted(&self) -> bool {
        matches!(self, TokenCheck::Accepted(_))
    }

    /// `Ok(None)` when disabled, `Ok(Some)` when accepted
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    pub fn into_result(self) -> SecurityResult<Option<Claims>> {
        match self {
            TokenCheck::Disabled => Ok(None),
            TokenCheck::Rejected(error) => Err(error),
            TokenCheck::Accepted(claims) => Ok(Some(claims)),
        }
    }
}

impl From<SecurityResult<Claims>> for TokenCheck {
    fn from(result: SecurityResult<Claims>) -> Self {
        match result {
            Ok(claims) => TokenCheck::Accepted(claims),
            Err(error) => TokenCheck::Rejected(error),
        }
    }
}

/// Builder for [`SecurityFacade`]
#[derive(Debug)]
pub struct SecurityFacadeBuilder {
    settings: SecuritySettings,
    store: Arc<dyn IdentityStore>,
    cache: Option<IdentityCache>,
    clock: Arc<dyn Clock>,
    jwks_refresh_interval: Option<Duration>,
}

impl SecurityFacadeBuilder {
    /// Use an existing identity cache (shared with other components)
    pub fn identity_cache(mut self, cache: IdentityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the clock used for token timestamps
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Minimum time between JWKS refreshes (remote strategy)
    pub fn jwks_refresh_interval(mut self, interval: Duration) -> Self {
        self.jwks_refresh_interval = Some(interval);
        self
    }

    /// Build the facade
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Configuration`] if the settings are
    /// inconsistent, or [`SecurityError::TokenKeyInvalid`] if the HMAC key
    /// cannot be used.
    pub fn build(self) -> SecurityResult<SecurityFacade> {
        let settings = self.settings;
        settings
            .validate()
            .map_err(|e| SecurityError::Configuration(e.to_string()))?;

        let strategy = match settings.strategy() {
            StrategyKind::Local => {
                let codec = match &settings.token_key {
                    Some(key) => LocalTokenCodec::new(
                        HmacKey::from_base64(key.expose_secret())?,
                        settings.token_issuer.clone(),
                        settings.token_lifetime(),
                    ),
                    None => LocalTokenCodec::without_key(
                        settings.token_issuer.clone(),
                        settings.token_lifetime(),
                    ),
                };
                TokenStrategy::Local(codec.with_clock(self.clock.clone()))
            }
            StrategyKind::Remote => {
                let jwks_uri = settings.cert_url.as_deref().unwrap_or_default().trim();
                let mut jwks = JwksClient::builder(jwks_uri)
                    .timeout(settings.cert_timeout())
                    .retry_policy(settings.cert_retry_policy());
                if let Some(interval) = self.jwks_refresh_interval {
                    jwks = jwks.min_refresh_interval(interval);
                }

                let validator = RemoteTokenValidator::new(
                    jwks.build()?,
                    settings.audience.as_deref(),
                    settings.authorized_party.as_deref(),
                )
                .with_clock_skew(settings.clock_skew())
                .with_clock(self.clock.clone());
                TokenStrategy::Remote(validator)
            }
        };

        let cache = settings
            .user_cache
            .then(|| self.cache.unwrap_or_default());
        let resolver = IdentityResolver::new(
            self.store.clone(),
            cache,
            SessionGuard::new(self.store, settings.session_control),
            ResolverOptions {
                init_from_claims: settings.init_user_from_claims,
                public_user: settings.public_user.clone(),
            },
        );

        info!(
            strategy = ?strategy.kind(),
            token_enabled = settings.token_enabled,
            user_cache = settings.user_cache,
            session_control = settings.session_control,
            "Security facade ready"
        );

        Ok(SecurityFacade {
            strategy,
            token_enabled: settings.token_enabled,
            issuer: settings.token_issuer,
            clock: self.clock,
            resolver,
        })
    }
}

/// Entry point for issuing, checking and resolving tokens
#[derive(Debug, Clone)]
pub struct SecurityFacade {
    strategy: TokenStrategy,
    token_enabled: bool,
    issuer: String,
    clock: Arc<dyn Clock>,
    resolver: IdentityResolver,
}

impl SecurityFacade {
    /// Start building a facade
    pub fn builder(
        settings: SecuritySettings,
        store: Arc<dyn IdentityStore>,
    ) -> SecurityFacadeBuilder {
        SecurityFacadeBuilder {
            settings,
            store,
            cache: None,
            clock: Arc::new(SystemClock),
            jwks_refresh_interval: None,
        }
    }

    /// Build a facade with default collaborators
    ///
    /// # Errors
    ///
    /// See [`SecurityFacadeBuilder::build`].
    pub fn new(
        settings: SecuritySettings,
        store: Arc<dyn IdentityStore>,
    ) -> SecurityResult<Self> {
        Self::builder(settings, store).build()
    }

    /// The active strategy
    pub fn strategy(&self) -> &TokenStrategy {
        &self.strategy
    }

    /// The identity cache, if caching is enabled
    pub fn identity_cache(&self) -> Option<&IdentityCache> {
        self.resolver.cache()
    }

    /// Issue a local token; `None` in gives `None` out
    ///
    /// # Errors
    ///
    /// - [`SecurityError::Configuration`] with the remote strategy, where the
    ///   identity provider issues tokens
    /// - [`SecurityError::TokenKeyInvalid`] if no usable key is configured
    pub fn issue_token(&self, identity: Option<&Identity>) -> SecurityResult<Option<String>> {
        let Some(identity) = identity else {
            return Ok(None);
        };

        match &self.strategy {
            TokenStrategy::Local(codec) => codec.issue(identity).map(Some),
            TokenStrategy::Remote(_) => Err(SecurityError::Configuration(
                "tokens are issued by the identity provider".to_string(),
            )),
        }
    }

    /// Check a token with the active strategy
    pub async fn check_token(&self, token: &str) -> TokenCheck {
        if !self.token_enabled {
            return TokenCheck::Disabled;
        }

        let result = match &self.strategy {
            TokenStrategy::Local(codec) => codec.validate(token),
            TokenStrategy::Remote(validator) => validator.validate(token).await,
        };

        if let Err(error) = &result {
            debug!(category = error.category(), "Token check failed");
        }
        result.into()
    }

    /// Check the token carried in the `Token` request header
    pub async fn check_request(&self, headers: &HeaderMap) -> TokenCheck {
        if !self.token_enabled {
            return TokenCheck::Disabled;
        }

        match token_from_headers(headers) {
            Some(token) => self.check_token(token).await,
            None => TokenCheck::Rejected(SecurityError::TokenMalformed(
                "missing Token header".to_string(),
            )),
        }
    }

    /// Verify a local token against an explicitly supplied BASE64 key
    ///
    /// Works with either strategy and ignores `security.token`.
    ///
    /// # Errors
    ///
    /// Same as [`LocalTokenCodec::validate_with_key`].
    pub fn validate_token_with_key(&self, token: &str, key: &str) -> SecurityResult<Claims> {
        match &self.strategy {
            TokenStrategy::Local(codec) => codec.validate_with_key(token, key),
            TokenStrategy::Remote(_) => LocalTokenCodec::without_key(self.issuer.clone(), None)
                .with_clock(self.clock.clone())
                .validate_with_key(token, key),
        }
    }

    /// Resolve the identity for verified claims
    ///
    /// # Errors
    ///
    /// - [`SecurityError::MalformedClaim`] if the claims name no user
    /// - [`SecurityError::SessionNotActive`] if session control rejects the user
    /// - [`SecurityError::IdentityInitFailed`] if the identity store fails
    pub async fn resolve_identity(&self, claims: &Claims) -> SecurityResult<Arc<Identity>> {
        let username = claims.username().ok_or_else(|| {
            SecurityError::MalformedClaim("token names no user".to_string())
        })?;
        self.resolver.resolve(username, Some(claims)).await
    }

    /// Resolve the configured public user
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::IdentityInitFailed`] if the identity store fails.
    pub async fn public_identity(&self) -> SecurityResult<Option<Arc<Identity>>> {
        self.resolver.public_identity().await
    }

    /// Check a token and resolve its identity in one step
    ///
    /// With token checking disabled this resolves the public user, if any.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason or the resolution failure.
    pub async fn authenticate(&self, token: &str) -> SecurityResult<Option<Arc<Identity>>> {
        match self.check_token(token).await {
            TokenCheck::Disabled => self.public_identity().await,
            TokenCheck::Rejected(error) => Err(error),
            TokenCheck::Accepted(claims) => self.resolve_identity(&claims).await.map(Some),
        }
    }

    /// Drop the cached identity for `username`
    pub async fn invalidate_identity(&self, username: &str) {
        self.resolver.invalidate(username).await;
    }

    /// Release cached state: identities and, for the remote strategy, keys
    pub async fn shutdown(&self) {
        self.resolver.invalidate_all();
        if let TokenStrategy::Remote(validator) = &self.strategy {
            validator.jwks().clear_cache().await;
        }
        info!("Security facade shut down");
    }
}
