//! Identity cache and resolver
//!
//! [`IdentityCache`] maps usernames to shared [`Identity`] values. It has no
//! expiry and no eviction; entries live until invalidated. Concurrent first
//! resolutions of one username share a single build, while unrelated
//! usernames never wait on each other. Failed builds are not cached.
//!
//! [`IdentityResolver`] decides what the identity store builds from, runs
//! the session guard, and goes through the cache when caching is enabled.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, instrument};

use crate::claims::Claims;
use crate::error::{SecurityError, SecurityResult};
use crate::session::SessionGuard;
use crate::store::IdentityStore;
use crate::types::{Identity, IdentityInit};

/// Process-wide username → identity map
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct IdentityCache {
    entries: Cache<String, Arc<Identity>>,
}

impl IdentityCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().name("identity").build(),
        }
    }

    /// Cached identity for `username`
    pub async fn get(&self, username: &str) -> Option<Arc<Identity>> {
        self.entries.get(username).await
    }

    /// Whether `username` is cached
    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    /// Store an identity under `username`
    pub async fn insert(&self, username: impl Into<String>, identity: Arc<Identity>) {
        self.entries.insert(username.into(), identity).await;
    }

    /// Remove `username`
    pub async fn invalidate(&self, username: &str) {
        self.entries.invalidate(username).await;
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of cached identities (eventually consistent)
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Whether the cache holds no identities (eventually consistent)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached identity for `username`, building it with `build` on a miss
    ///
    /// Concurrent callers for the same username wait for one build and share
    /// its result. A failed build leaves the cache untouched.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `build`.
    pub async fn get_or_build<F>(&self, username: &str, build: F) -> SecurityResult<Arc<Identity>>
    where
        F: Future<Output = SecurityResult<Arc<Identity>>>,
    {
        self.entries
            .try_get_with_by_ref(username, build)
            .await
            .map_err(|e| (*e).clone())
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

/// Options for [`IdentityResolver`]
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Build identities from the full claim set instead of the username
    pub init_from_claims: bool,
    /// Username used for anonymous access
    pub public_user: Option<String>,
}

/// Turns verified claims into an application identity
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    cache: Option<IdentityCache>,
    session: SessionGuard,
    options: ResolverOptions,
}

impl IdentityResolver {
    /// Create a resolver; `cache` of `None` consults the store on every call
    pub fn new(
        store: Arc<dyn IdentityStore>,
        cache: Option<IdentityCache>,
        session: SessionGuard,
        options: ResolverOptions,
    ) -> Self {
        Self {
            store,
            cache,
            session,
            options,
        }
    }

    /// The cache, if caching is enabled
    pub fn cache(&self) -> Option<&IdentityCache> {
        self.cache.as_ref()
    }

    /// Resolve the identity for `username`
    ///
    /// The session guard runs on every call, cache hits included.
    ///
    /// # Errors
    ///
    /// - [`SecurityError::SessionNotActive`] if session control rejects the user
    /// - [`SecurityError::IdentityInitFailed`] if the identity store fails
    #[instrument(skip(self, claims), fields(from_claims = tracing::field::Empty))]
    pub async fn resolve(
        &self,
        username: &str,
        claims: Option<&Claims>,
    ) -> SecurityResult<Arc<Identity>> {
        self.session.check_active(username).await?;

        let init = match claims {
            Some(claims) if self.options.init_from_claims => IdentityInit::Claims(claims.clone()),
            _ => IdentityInit::Username(username.to_string()),
        };
        tracing::Span::current().record("from_claims", matches!(init, IdentityInit::Claims(_)));

        self.lookup(username, init).await
    }

    /// Resolve the configured public user, or `None` if there is none
    ///
    /// Anonymous access has no login, so the session guard is not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::IdentityInitFailed`] if the identity store fails.
    pub async fn public_identity(&self) -> SecurityResult<Option<Arc<Identity>>> {
        let Some(public_user) = self.options.public_user.as_deref() else {
            return Ok(None);
        };

        self.lookup(public_user, IdentityInit::Username(public_user.to_string()))
            .await
            .map(Some)
    }

    /// Drop a cached identity so the next resolution rebuilds it
    pub async fn invalidate(&self, username: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(username).await;
            debug!(username, "Identity invalidated");
        }
    }

    /// Drop every cached identity
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    async fn lookup(&self, username: &str, init: IdentityInit) -> SecurityResult<Arc<Identity>> {
        match &self.cache {
            Some(cache) => cache.get_or_build(username, self.build(username, init)).await,
            None => self.build(username, init).await,
        }
    }

    async fn build(&self, username: &str, init: IdentityInit) -> SecurityResult<Arc<Identity>> {
        match self.store.build_identity(init).await {
            Ok(identity) => {
                debug!(username, "Identity built");
                Ok(Arc::new(identity))
            }
            Err(source) => Err(SecurityError::IdentityInitFailed {
                username: username.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryIdentityStore;
    use crate::types::UserStatus;

    async fn resolver(cache: bool, public_user: Option<&str>) -> IdentityResolver {
        let store = MemoryIdentityStore::shared();
        store
            .insert_user(Identity::new("U1", "alice", UserStatus::Valid))
            .await;
        store
            .insert_user(Identity::new("G1", "guest", UserStatus::Valid))
            .await;

        IdentityResolver::new(
            store.clone(),
            cache.then(IdentityCache::new),
            SessionGuard::new(store, false),
            ResolverOptions {
                init_from_claims: false,
                public_user: public_user.map(ToOwned::to_owned),
            },
        )
    }

    #[tokio::test]
    async fn test_cache_returns_same_instance() {
        let resolver = resolver(true, None).await;
        let first = resolver.resolve("alice", None).await.unwrap();
        let second = resolver.resolve("alice", None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(resolver.cache().unwrap().contains("alice"));
    }

    #[tokio::test]
    async fn test_without_cache_builds_fresh() {
        let resolver = resolver(false, None).await;
        let first = resolver.resolve("alice", None).await.unwrap();
        let second = resolver.resolve("alice", None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let resolver = resolver(true, None).await;
        let first = resolver.resolve("alice", None).await.unwrap();
        resolver.invalidate("alice").await;
        let second = resolver.resolve("alice", None).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_cached() {
        let resolver = resolver(true, None).await;
        let err = resolver.resolve("bob", None).await.unwrap_err();
        assert!(matches!(
            err,
            SecurityError::IdentityInitFailed { ref username, .. } if username == "bob"
        ));
        assert!(!resolver.cache().unwrap().contains("bob"));
    }

    #[tokio::test]
    async fn test_public_identity() {
        let with_guest = resolver(true, Some("guest")).await;
        let guest = with_guest.public_identity().await.unwrap().unwrap();
        assert_eq!(guest.user_id, "G1");

        let without_guest = resolver(true, None).await;
        assert!(without_guest.public_identity().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_direct_access() {
        let cache = IdentityCache::new();
        let identity = Arc::new(Identity::new("U9", "zoe", UserStatus::Locked));

        assert!(cache.get("zoe").await.is_none());
        cache.insert("zoe", identity.clone()).await;
        assert!(Arc::ptr_eq(&cache.get("zoe").await.unwrap(), &identity));

        cache.clear();
        assert!(cache.get("zoe").await.is_none());
    }
}
