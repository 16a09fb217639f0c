//! Authorized-party (`azp`) check for public, roleless clients
//!
//! Some public clients receive tokens that carry `azp` instead of an
//! audience. When no audience is configured, the remote validator swaps its
//! audience check for this predicate.

use std::collections::BTreeSet;

use crate::claims::Claims;
use crate::error::{SecurityError, SecurityResult};

/// Accepts tokens whose `azp` claim is one of a fixed set of client ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedPartyValidator {
    accepted: BTreeSet<String>,
}

impl AuthorizedPartyValidator {
    /// Build from a comma-separated list such as `"mobile1, mobile2"`
    pub fn new(accepted: &str) -> Self {
        Self {
            accepted: accepted
                .split(',')
                .map(str::trim)
                .filter(|client| !client.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        }
    }

    /// Accepted client ids
    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(String::as_str)
    }

    /// Check the `azp` claim
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::MalformedClaim`] if `azp` is missing or not accepted.
    pub fn validate(&self, claims: &Claims) -> SecurityResult<()> {
        match claims.authorized_party() {
            Some(azp) if self.accepted.contains(azp) => Ok(()),
            Some(azp) => Err(SecurityError::MalformedClaim(format!(
                "azp '{azp}' is not an accepted client"
            ))),
            None => Err(SecurityError::MalformedClaim("azp claim is missing".to_string())),
        }
    }
}
