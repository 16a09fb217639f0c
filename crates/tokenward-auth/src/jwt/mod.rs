//! JWT Infrastructure - token signing and validation
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Security Facade              │
//! └─────────────────────────────────────┘
//!          │                  │
//!   ┌──────┴──────┐    ┌──────┴───────┐
//!   │   Local     │    │   Remote     │
//!   │  HS512      │    │  RS256+JWKS  │
//!   └─────────────┘    └──────┬───────┘
//!                             │
//!                  ┌──────────┴─────────┐
//!                  │ audience │  azp    │
//!                  └────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `local` - self-issued tokens signed with a shared HMAC key
//! - `azp` - authorized-party predicate for roleless public clients
//! - `jwks` - JWKS fetching, caching and rotation
//! - `remote` - federated (OIDC) token validation

pub mod azp;
pub mod jwks;
pub mod local;
pub mod remote;

pub use azp::AuthorizedPartyValidator;
pub use jwks::{JwksClient, RetryPolicy};
pub use local::{HmacKey, LocalTokenCodec};
pub use remote::RemoteTokenValidator;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use serde::Deserialize;

use crate::error::{SecurityError, SecurityResult};

/// The part of the JOSE header read before any verification
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PeekedHeader {
    pub(crate) alg: String,
    #[serde(default)]
    pub(crate) kid: Option<String>,
}

/// Decode the header segment without trusting anything else in the token
///
/// Used to enforce the algorithm allow-list on the raw `alg` string, so that
/// values such as `none` are rejected before a key is chosen.
pub(crate) fn peek_header(token: &str) -> SecurityResult<PeekedHeader> {
    let mut segments = token.split('.');
    let (Some(header), Some(_payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(SecurityError::TokenMalformed(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| SecurityError::TokenMalformed(format!("invalid header encoding: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| SecurityError::TokenMalformed(format!("invalid header: {e}")))
}

/// Translate a `jsonwebtoken` failure into the engine's error kinds
pub(crate) fn map_jwt_error(err: JwtError) -> SecurityError {
    match err.kind() {
        ErrorKind::InvalidSignature => SecurityError::TokenSignatureInvalid,
        ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm => SecurityError::TokenUnsupported(err.to_string()),
        ErrorKind::InvalidAudience => SecurityError::MalformedClaim(
            "aud does not match the configured audience".to_string(),
        ),
        ErrorKind::InvalidIssuer => {
            SecurityError::MalformedClaim("iss is not an accepted issuer".to_string())
        }
        ErrorKind::ImmatureSignature => {
            SecurityError::MalformedClaim("token is not valid yet (nbf)".to_string())
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            SecurityError::MalformedClaim(format!("required claim '{claim}' is missing"))
        }
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
            SecurityError::TokenKeyInvalid(err.to_string())
        }
        _ => SecurityError::TokenMalformed(err.to_string()),
    }
}
