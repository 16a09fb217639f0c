//! Federated token validation (RS256 tokens from an OIDC provider)
//!
//! Verification order: algorithm allow-list on the raw header, key lookup by
//! `kid`, signature, expiry, then either the audience or the authorized
//! party. Every failure is reported as [`SecurityError::TokenInvalid`]
//! wrapping the specific cause.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, Validation, decode};
use tracing::{debug, instrument, warn};

use super::azp::AuthorizedPartyValidator;
use super::jwks::JwksClient;
use super::{map_jwt_error, peek_header};
use crate::claims::{Claims, RawClaims};
use crate::clock::{Clock, SystemClock};
use crate::error::{SecurityError, SecurityResult};

/// Algorithms accepted from the identity provider
const ALLOWED_ALGORITHMS: &[&str] = &["RS256"];

/// Validates tokens signed by an external identity provider
#[derive(Debug, Clone)]
pub struct RemoteTokenValidator {
    jwks: JwksClient,
    audience: Option<String>,
    authorized_party: Option<AuthorizedPartyValidator>,
    clock_skew: Duration,
    clock: Arc<dyn Clock>,
}

impl RemoteTokenValidator {
    /// Create a validator
    ///
    /// A blank `audience` counts as unset. The authorized-party list is only
    /// consulted when no audience is configured.
    pub fn new(
        jwks: JwksClient,
        audience: Option<&str>,
        authorized_party: Option<&str>,
    ) -> Self {
        let audience = audience
            .map(str::trim)
            .filter(|aud| !aud.is_empty())
            .map(ToOwned::to_owned);
        let authorized_party = authorized_party
            .filter(|azp| !azp.trim().is_empty())
            .map(AuthorizedPartyValidator::new);

        Self {
            jwks,
            audience,
            authorized_party,
            clock_skew: Duration::ZERO,
            clock: Arc::new(SystemClock),
        }
    }

    /// Tolerance added to `exp`
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Replace the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The key resolver
    pub fn jwks(&self) -> &JwksClient {
        &self.jwks
    }

    /// Configured audience, if any
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Validate a token
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::TokenInvalid`]; use
    /// [`SecurityError::root_cause`] for the specific reason.
    #[instrument(skip(self, token), fields(jwks_uri = %self.jwks.jwks_uri()))]
    pub async fn validate(&self, token: &str) -> SecurityResult<Claims> {
        match self.verify(token).await {
            Ok(claims) => {
                debug!(username = ?claims.username(), "Remote token accepted");
                Ok(claims)
            }
            Err(cause) => {
                warn!(reason = %cause, category = cause.category(), "Remote token rejected");
                Err(SecurityError::token_invalid(cause))
            }
        }
    }

    async fn verify(&self, token: &str) -> SecurityResult<Claims> {
        let header = peek_header(token)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg.as_str()) {
            return Err(SecurityError::TokenUnsupported(header.alg));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| SecurityError::TokenMalformed("kid header is missing".to_string()))?;

        let key = self.jwks.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let data = decode::<RawClaims>(token, &key, &validation).map_err(map_jwt_error)?;

        let exp = data
            .claims
            .exp
            .ok_or_else(|| SecurityError::MalformedClaim("exp claim is missing".to_string()))?;
        if self.clock.now() >= Duration::from_secs(exp).saturating_add(self.clock_skew) {
            return Err(SecurityError::TokenExpired);
        }

        let claims = Claims::from_verified(data.claims);

        if self.audience.is_none()
            && let Some(authorized_party) = &self.authorized_party
        {
            authorized_party.validate(&claims)?;
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(audience: Option<&str>, azp: Option<&str>) -> RemoteTokenValidator {
        let jwks = JwksClient::builder("https://auth.example.com/jwks")
            .build()
            .unwrap();
        RemoteTokenValidator::new(jwks, audience, azp)
    }

    #[test]
    fn test_blank_audience_is_unset() {
        assert_eq!(validator(Some("  "), None).audience(), None);
        assert_eq!(validator(Some("api"), None).audience(), Some("api"));
    }

    #[test]
    fn test_blank_azp_is_unset() {
        assert!(validator(None, Some(" ")).authorized_party.is_none());
        assert!(validator(None, Some("mobile1")).authorized_party.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_wrapped() {
        // {"alg":"HS256","typ":"JWT"}.{}.sig
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.e30.c2ln";
        let err = validator(Some("api"), None).validate(token).await.unwrap_err();
        assert!(matches!(err, SecurityError::TokenInvalid(_)));
        assert_eq!(
            err.root_cause(),
            &SecurityError::TokenUnsupported("HS256".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_kid_wrapped() {
        // {"alg":"RS256"}.{}.sig
        let token = "eyJhbGciOiJSUzI1NiJ9.e30.c2ln";
        let err = validator(None, None).validate(token).await.unwrap_err();
        assert!(matches!(err.root_cause(), SecurityError::TokenMalformed(_)));
    }
}
