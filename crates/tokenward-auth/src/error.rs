//! Security error types for token validation and identity resolution
//!
//! Every failure in the engine is reported as a [`SecurityError`]. Library
//! error types (`jsonwebtoken`, `reqwest`) are mapped into these variants at
//! the boundary where they occur so callers only ever match on one enum.

use thiserror::Error;

use crate::store::IdentityStoreError;

/// Result type for security operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Comprehensive security error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// The compact token is not three base64url segments of valid JSON
    #[error("Malformed token: {0}")]
    TokenMalformed(String),

    /// Signature is valid but the expiration time has passed
    #[error("Token expired")]
    TokenExpired,

    /// The declared signing algorithm is not on the allow-list
    #[error("Unsupported token algorithm: {0}")]
    TokenUnsupported(String),

    /// Key material is absent, not BASE64, or too short for the algorithm
    #[error("Invalid token key: {0}")]
    TokenKeyInvalid(String),

    /// The signature does not match the header and payload
    #[error("Token signature does not verify")]
    TokenSignatureInvalid,

    /// Federated token validation failed; the cause is carried for logging
    #[error("Invalid federated token: {0}")]
    TokenInvalid(#[source] Box<SecurityError>),

    /// The remote key set could not be fetched or did not contain the key
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// A claim required by the trust policy is missing or not accepted
    #[error("Malformed claim: {0}")]
    MalformedClaim(String),

    /// The user has no active session (logged out or unknown)
    #[error("No active session for user '{0}'")]
    SessionNotActive(String),

    /// The identity store could not build an identity for the user
    #[error("Failed to initialize identity for '{username}': {source}")]
    IdentityInitFailed {
        /// Username the identity was requested for
        username: String,
        /// Store-side failure
        #[source]
        source: IdentityStoreError,
    },

    /// The operation is not available with the current configuration
    #[error("Security configuration error: {0}")]
    Configuration(String),
}

impl SecurityError {
    /// Wrap a failure as a federated-token rejection
    pub fn token_invalid(cause: SecurityError) -> Self {
        match cause {
            already @ SecurityError::TokenInvalid(_) => already,
            other => SecurityError::TokenInvalid(Box::new(other)),
        }
    }

    /// The innermost error, looking through [`SecurityError::TokenInvalid`]
    pub fn root_cause(&self) -> &SecurityError {
        match self {
            SecurityError::TokenInvalid(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Whether the failure was caused by the presented token rather than by
    /// infrastructure (key server, identity store, configuration)
    pub fn is_client_error(&self) -> bool {
        match self.root_cause() {
            SecurityError::KeySetUnavailable(_)
            | SecurityError::IdentityInitFailed { .. }
            | SecurityError::Configuration(_) => false,
            _ => true,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SecurityError::TokenMalformed(_) => "token_malformed",
            SecurityError::TokenExpired => "token_expired",
            SecurityError::TokenUnsupported(_) => "token_unsupported",
            SecurityError::TokenKeyInvalid(_) => "token_key_invalid",
            SecurityError::TokenSignatureInvalid => "token_signature_invalid",
            SecurityError::TokenInvalid(_) => "token_invalid",
            SecurityError::KeySetUnavailable(_) => "key_set_unavailable",
            SecurityError::MalformedClaim(_) => "malformed_claim",
            SecurityError::SessionNotActive(_) => "session_not_active",
            SecurityError::IdentityInitFailed { .. } => "identity_init_failed",
            SecurityError::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        let expired = SecurityError::TokenExpired;
        assert!(expired.is_client_error());
        assert_eq!(expired.category(), "token_expired");

        let unavailable = SecurityError::token_invalid(SecurityError::KeySetUnavailable(
            "connection refused".to_string(),
        ));
        assert_eq!(unavailable.category(), "token_invalid");
        assert!(!unavailable.is_client_error());
    }

    #[test]
    fn test_token_invalid_is_not_nested_twice() {
        let once = SecurityError::token_invalid(SecurityError::TokenExpired);
        let twice = SecurityError::token_invalid(once.clone());
        assert_eq!(once, twice);
        assert_eq!(twice.root_cause(), &SecurityError::TokenExpired);
    }

    #[test]
    fn test_error_display() {
        let error = SecurityError::MalformedClaim("azp 'other' is not accepted".to_string());
        assert_eq!(
            error.to_string(),
            "Malformed claim: azp 'other' is not accepted"
        );

        let wrapped = SecurityError::token_invalid(SecurityError::TokenSignatureInvalid);
        assert_eq!(
            wrapped.to_string(),
            "Invalid federated token: Token signature does not verify"
        );
    }

    #[test]
    fn test_identity_init_failure_keeps_source() {
        use std::error::Error as _;

        let error = SecurityError::IdentityInitFailed {
            username: "alice".to_string(),
            source: IdentityStoreError::UnknownUser("alice".to_string()),
        };
        assert!(error.source().is_some());
        assert!(!error.is_client_error());
    }
}
