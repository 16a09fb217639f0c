//! Identity store contract
//!
//! The identity store is the collaborator that knows how to turn a username
//! (or a full claim set) into an [`Identity`], and whether the user's most
//! recent login is still open. [`MemoryIdentityStore`] is an in-process
//! implementation for demos and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{Identity, IdentityInit};

/// Errors reported by an identity store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityStoreError {
    /// No user with this name exists
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// The init payload cannot be turned into an identity
    #[error("Invalid identity data: {0}")]
    InvalidData(String),

    /// The backing store could not be reached
    #[error("Identity store unavailable: {0}")]
    Unavailable(String),
}

/// Builds identities and reports session liveness
#[async_trait]
pub trait IdentityStore: Send + Sync + std::fmt::Debug {
    /// Build the identity for a user
    async fn build_identity(&self, init: IdentityInit) -> Result<Identity, IdentityStoreError>;

    /// Whether the user's most recent login has no recorded logout
    async fn check_session_active(&self, username: &str) -> Result<bool, IdentityStoreError>;
}

/// Most recent login of a user; open while `logout_at` is unset
#[derive(Debug, Clone, Copy, Default)]
struct LoginRecord {
    logout_at: Option<SystemTime>,
}

/// In-memory identity store
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<String, Identity>>,
    logins: RwLock<HashMap<String, LoginRecord>>,
}

impl MemoryIdentityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an `Arc`, ready to hand to the facade
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add or replace a user
    pub async fn insert_user(&self, identity: Identity) {
        self.users
            .write()
            .await
            .insert(identity.username.clone(), identity);
    }

    /// Record a login; opens a new session for the user
    pub async fn record_login(&self, username: &str) {
        self.logins
            .write()
            .await
            .insert(username.to_string(), LoginRecord::default());
    }

    /// Record a logout on the user's most recent login
    pub async fn record_logout(&self, username: &str) -> bool {
        match self.logins.write().await.get_mut(username) {
            Some(record) => {
                record.logout_at = Some(SystemTime::now());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn build_identity(&self, init: IdentityInit) -> Result<Identity, IdentityStoreError> {
        let username = init
            .username()
            .ok_or_else(|| IdentityStoreError::InvalidData("no username in claims".to_string()))?;

        let users = self.users.read().await;
        let mut identity = users
            .get(username)
            .cloned()
            .ok_or_else(|| IdentityStoreError::UnknownUser(username.to_string()))?;

        if let IdentityInit::Claims(claims) = &init {
            for (name, value) in claims.extra() {
                identity
                    .attributes
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            if identity.locale.is_none() {
                identity.locale = claims.lang().map(ToOwned::to_owned);
            }
        }

        debug!(username = %identity.username, "Built identity from memory store");
        Ok(identity)
    }

    async fn check_session_active(&self, username: &str) -> Result<bool, IdentityStoreError> {
        if !self.users.read().await.contains_key(username) {
            return Err(IdentityStoreError::UnknownUser(username.to_string()));
        }

        Ok(self
            .logins
            .read()
            .await
            .get(username)
            .is_some_and(|record| record.logout_at.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserStatus;

    #[tokio::test]
    async fn test_build_identity_by_username() {
        let store = MemoryIdentityStore::new();
        store
            .insert_user(Identity::new("U1", "alice", UserStatus::Valid))
            .await;

        let identity = store
            .build_identity(IdentityInit::Username("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "U1");

        let missing = store
            .build_identity(IdentityInit::Username("bob".to_string()))
            .await;
        assert_eq!(
            missing,
            Err(IdentityStoreError::UnknownUser("bob".to_string()))
        );
    }

    #[tokio::test]
    async fn test_session_tracking() {
        let store = MemoryIdentityStore::new();
        store
            .insert_user(Identity::new("U1", "alice", UserStatus::Valid))
            .await;

        assert_eq!(store.check_session_active("alice").await, Ok(false));

        store.record_login("alice").await;
        assert_eq!(store.check_session_active("alice").await, Ok(true));

        assert!(store.record_logout("alice").await);
        assert_eq!(store.check_session_active("alice").await, Ok(false));

        store.record_login("alice").await;
        assert_eq!(store.check_session_active("alice").await, Ok(true));

        assert!(store.check_session_active("nobody").await.is_err());
    }
}
