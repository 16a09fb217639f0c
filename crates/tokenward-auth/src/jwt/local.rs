//! Self-issued tokens signed with a shared symmetric key (HS512)
//!
//! The key is configured as BASE64 text and must decode to at least 64
//! bytes. Expiry is checked against the codec's [`Clock`] after the
//! signature has been verified.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, warn};

use super::{map_jwt_error, peek_header};
use crate::claims::{Claims, RawClaims};
use crate::clock::{Clock, SystemClock};
use crate::error::{SecurityError, SecurityResult};
use crate::types::Identity;

/// The only algorithm local tokens are signed or accepted with
pub const LOCAL_ALGORITHM: Algorithm = Algorithm::HS512;

/// Minimum key length for HS512 (RFC 7518 section 3.2)
const MIN_KEY_BYTES: usize = 64;

/// Decoded HMAC key material
#[derive(Clone)]
pub struct HmacKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl HmacKey {
    /// Decode a BASE64 key
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::TokenKeyInvalid`] if the key is empty, is not
    /// BASE64, or decodes to fewer than 64 bytes.
    pub fn from_base64(key: &str) -> SecurityResult<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SecurityError::TokenKeyInvalid("key is empty".to_string()));
        }

        let bytes = STANDARD
            .decode(key)
            .map_err(|e| SecurityError::TokenKeyInvalid(format!("key is not BASE64: {e}")))?;

        Self::from_bytes(&bytes)
    }

    /// Use raw key bytes
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::TokenKeyInvalid`] if fewer than 64 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> SecurityResult<Self> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(SecurityError::TokenKeyInvalid(format!(
                "HS512 requires at least {MIN_KEY_BYTES} key bytes, got {}",
                bytes.len()
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacKey([REDACTED])")
    }
}

/// Issues and verifies HS512 tokens
#[derive(Debug, Clone)]
pub struct LocalTokenCodec {
    key: Option<HmacKey>,
    issuer: String,
    lifetime: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl LocalTokenCodec {
    /// Create a codec
    ///
    /// `lifetime` of `None` issues tokens without an `exp` claim.
    pub fn new(key: HmacKey, issuer: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            key: Some(key),
            issuer: issuer.into(),
            lifetime,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a codec with no configured key
    ///
    /// Only [`LocalTokenCodec::validate_with_key`] is usable; everything else
    /// fails with [`SecurityError::TokenKeyInvalid`].
    pub fn without_key(issuer: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            key: None,
            issuer: issuer.into(),
            lifetime,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issuer written into the `iss` claim
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Lifetime of issued tokens
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    fn key(&self) -> SecurityResult<&HmacKey> {
        self.key
            .as_ref()
            .ok_or_else(|| SecurityError::TokenKeyInvalid("no signing key configured".to_string()))
    }

    /// Sign a token for `identity`
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::TokenKeyInvalid`] if no key is configured or
    /// signing fails.
    pub fn issue(&self, identity: &Identity) -> SecurityResult<String> {
        let key = self.key()?;
        let now = self.clock.now();

        let claims = RawClaims {
            user_id: Some(identity.user_id.clone()),
            user_name: Some(identity.username.clone()),
            status: Some(identity.status.as_str().to_string()),
            lang: identity.language().map(ToOwned::to_owned),
            iss: Some(self.issuer.clone()),
            sub: Some(identity.username.clone()),
            jti: Some(identity.user_id.clone()),
            iat: Some(now.as_secs()),
            // exp is whole seconds, so sub-second lifetimes are truncated
            exp: self.lifetime.map(|lifetime| (now + lifetime).as_secs()),
            ..RawClaims::default()
        };

        let token = encode(&Header::new(LOCAL_ALGORITHM), &claims, &key.encoding)
            .map_err(|e| SecurityError::TokenKeyInvalid(format!("signing failed: {e}")))?;

        debug!(
            username = %identity.username,
            expires = ?claims.exp,
            "Issued local token"
        );
        Ok(token)
    }

    /// Verify a token with the configured key
    ///
    /// # Errors
    ///
    /// - [`SecurityError::TokenKeyInvalid`] if no key is configured
    /// - [`SecurityError::TokenUnsupported`] if `alg` is not HS512
    /// - [`SecurityError::TokenMalformed`] if the token cannot be decoded
    /// - [`SecurityError::TokenSignatureInvalid`] if the signature does not verify
    /// - [`SecurityError::TokenExpired`] if `exp` is not after the current time
    pub fn validate(&self, token: &str) -> SecurityResult<Claims> {
        let key = self.key()?;
        self.verify(token, key)
    }

    /// Verify a token with an explicitly supplied BASE64 key
    ///
    /// # Errors
    ///
    /// Same as [`LocalTokenCodec::validate`]; key problems are reported as
    /// [`SecurityError::TokenKeyInvalid`].
    pub fn validate_with_key(&self, token: &str, key: &str) -> SecurityResult<Claims> {
        let key = HmacKey::from_base64(key)?;
        self.verify(token, &key)
    }

    fn verify(&self, token: &str, key: &HmacKey) -> SecurityResult<Claims> {
        let header = peek_header(token)?;
        if header.alg != "HS512" {
            warn!(algorithm = %header.alg, "Local token uses an unsupported algorithm");
            return Err(SecurityError::TokenUnsupported(header.alg));
        }

        // exp is checked against our own clock once the signature is known good
        let mut validation = Validation::new(LOCAL_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<RawClaims>(token, &key.decoding, &validation).map_err(|e| {
            let error = map_jwt_error(e);
            debug!(error = %error, "Local token rejected");
            error
        })?;

        if let Some(exp) = data.claims.exp
            && self.clock.now() >= Duration::from_secs(exp)
        {
            debug!(exp, "Local token expired");
            return Err(SecurityError::TokenExpired);
        }

        Ok(Claims::from_verified(data.claims))
    }
}

/// Interpret a configured timeout in milliseconds; negative disables expiry
pub fn lifetime_from_millis(timeout_ms: i64) -> Option<Duration> {
    u64::try_from(timeout_ms).ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::types::UserStatus;

    fn test_key() -> HmacKey {
        HmacKey::from_bytes(&[7u8; 64]).unwrap()
    }

    fn alice() -> Identity {
        Identity::new("U1", "alice", UserStatus::Valid).with_locale("en-GB")
    }

    #[test]
    fn test_issued_claims() {
        let clock = TestClock::at(Duration::from_secs(1_700_000_000));
        let codec = LocalTokenCodec::new(test_key(), "tokenward", Some(Duration::from_secs(60)))
            .with_clock(Arc::new(clock));

        let token = codec.issue(&alice()).unwrap();
        let claims = codec.validate(&token).unwrap();

        assert_eq!(claims.user_id(), Some("U1"));
        assert_eq!(claims.user_name(), Some("alice"));
        assert_eq!(claims.status(), Some("VALID"));
        assert_eq!(claims.lang(), Some("en"));
        assert_eq!(claims.issuer(), Some("tokenward"));
        assert_eq!(claims.subject(), Some("alice"));
        assert_eq!(claims.id(), Some("U1"));
        assert_eq!(claims.issued_at(), Some(1_700_000_000));
        assert_eq!(claims.expiration(), Some(1_700_000_060));
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let clock = TestClock::at(Duration::from_secs(1_700_000_000));
        let codec = LocalTokenCodec::new(test_key(), "tokenward", Some(Duration::from_secs(10)))
            .with_clock(Arc::new(clock.clone()));
        let token = codec.issue(&alice()).unwrap();

        clock.advance(Duration::from_millis(9_999));
        assert!(codec.validate(&token).is_ok());

        clock.advance(Duration::from_millis(1));
        assert_eq!(codec.validate(&token), Err(SecurityError::TokenExpired));
    }

    #[test]
    fn test_missing_key() {
        let codec = LocalTokenCodec::without_key("tokenward", None);
        assert!(matches!(
            codec.issue(&alice()),
            Err(SecurityError::TokenKeyInvalid(_))
        ));
        assert!(matches!(
            codec.validate("a.b.c"),
            Err(SecurityError::TokenKeyInvalid(_))
        ));
    }

    #[test]
    fn test_key_validation() {
        assert!(matches!(
            HmacKey::from_base64("   "),
            Err(SecurityError::TokenKeyInvalid(_))
        ));
        assert!(matches!(
            HmacKey::from_base64("not base64 at all!"),
            Err(SecurityError::TokenKeyInvalid(_))
        ));
        let short = STANDARD.encode([1u8; 32]);
        assert!(matches!(
            HmacKey::from_base64(&short),
            Err(SecurityError::TokenKeyInvalid(_))
        ));
        let long_enough = STANDARD.encode([1u8; 64]);
        assert!(HmacKey::from_base64(&long_enough).is_ok());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", test_key()), "HmacKey([REDACTED])");
    }

    #[test]
    fn test_other_hmac_algorithms_unsupported() {
        let codec = LocalTokenCodec::new(test_key(), "tokenward", None);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({"userName": "alice"}),
            &EncodingKey::from_secret(&[7u8; 64]),
        )
        .unwrap();

        assert_eq!(
            codec.validate(&token),
            Err(SecurityError::TokenUnsupported("HS256".to_string()))
        );
    }

    #[test]
    fn test_lifetime_from_millis() {
        assert_eq!(lifetime_from_millis(-1), None);
        assert_eq!(lifetime_from_millis(0), Some(Duration::ZERO));
        assert_eq!(lifetime_from_millis(1500), Some(Duration::from_millis(1500)));
    }
}
