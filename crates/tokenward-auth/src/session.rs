//! Session liveness check
//!
//! A token can still be cryptographically valid after its user logged out.
//! When session control is on, every identity resolution first asks the
//! identity store whether the user's latest login is still open.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{SecurityError, SecurityResult};
use crate::store::IdentityStore;

/// Rejects users whose most recent login has been closed
#[derive(Debug, Clone)]
pub struct SessionGuard {
    store: Arc<dyn IdentityStore>,
    enabled: bool,
}

impl SessionGuard {
    /// Create a guard; a disabled guard accepts everyone
    pub fn new(store: Arc<dyn IdentityStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Whether session control is on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check that `username` has an open session
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::SessionNotActive`] if the store reports the
    /// session as closed or cannot answer (unknown user, store unavailable).
    pub async fn check_active(&self, username: &str) -> SecurityResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.store.check_session_active(username).await {
            Ok(true) => {
                debug!(username, "Session active");
                Ok(())
            }
            Ok(false) => {
                warn!(username, "Session is not active");
                Err(SecurityError::SessionNotActive(username.to_string()))
            }
            Err(e) => {
                warn!(username, error = %e, "Session check failed");
                Err(SecurityError::SessionNotActive(username.to_string()))
            }
        }
    }
}
