//! Common test utilities for integration tests
//!
//! This module provides a mock identity provider serving a JWKS, RSA test
//! keys, token builders, and an identity store that counts its calls.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokenward_auth::{
    Identity, IdentityInit, IdentityStore, IdentityStoreError, MemoryIdentityStore,
    SecuritySettings, UserStatus,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A 64-byte HMAC key, BASE64 encoded
pub fn local_key() -> String {
    STANDARD.encode([0x5au8; 64])
}

/// Settings for the local strategy with the test key
pub fn local_settings() -> SecuritySettings {
    SecuritySettings {
        token_key: Some(SecretString::new(local_key())),
        ..SecuritySettings::default()
    }
}

/// Mock OIDC provider exposing `/jwks`
pub struct MockIdentityProvider {
    pub server: MockServer,
    pub jwks_uri: String,
}

impl MockIdentityProvider {
    /// Start a new mock provider
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_uri = format!("{}/jwks", server.uri());
        Self { server, jwks_uri }
    }

    /// Serve `keys` from `/jwks`
    pub async fn mock_jwks(&self, keys: &[&TestKey]) {
        self.jwks_mock(keys).mount(&self.server).await;
    }

    /// Serve `keys` and assert the endpoint is hit exactly `times` times
    pub async fn mock_jwks_expect(&self, keys: &[&TestKey], times: u64) {
        self.jwks_mock(keys).expect(times).mount(&self.server).await;
    }

    /// Answer `/jwks` with `status` for the next `times` requests
    pub async fn mock_jwks_status(&self, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Remove every mock (to rotate keys)
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Settings pointing the remote strategy at this provider
    pub fn settings(&self, audience: Option<&str>, authorized_party: Option<&str>) -> SecuritySettings {
        SecuritySettings {
            cert_url: Some(self.jwks_uri.clone()),
            audience: audience.map(ToOwned::to_owned),
            authorized_party: authorized_party.map(ToOwned::to_owned),
            ..SecuritySettings::default()
        }
    }

    fn jwks_mock(&self, keys: &[&TestKey]) -> Mock {
        let keys: Vec<Value> = keys.iter().map(|key| key.jwk()).collect();
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
    }
}

/// An RSA signing key with a key id
pub struct TestKey {
    pub kid: String,
    private_key: &'static RsaPrivateKey,
}

impl TestKey {
    /// The first test key
    pub fn primary(kid: &str) -> Self {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        Self {
            kid: kid.to_string(),
            private_key: KEY.get_or_init(generate_rsa_key),
        }
    }

    /// A second, unrelated test key
    pub fn secondary(kid: &str) -> Self {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        Self {
            kid: kid.to_string(),
            private_key: KEY.get_or_init(generate_rsa_key),
        }
    }

    /// Public half as a JWK
    pub fn jwk(&self) -> Value {
        let public_key = self.private_key.to_public_key();
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        })
    }

    /// Sign `claims` with RS256, naming this key in the header
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with an arbitrary header
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let pem = self
            .private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("Failed to encode private key");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("Invalid RSA key");
        encode(header, claims, &key).expect("Failed to encode test JWT")
    }
}

fn generate_rsa_key() -> RsaPrivateKey {
    let mut rng = rand::thread_rng();
    RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key")
}

/// Build an unsigned token (`alg: none`)
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Federated claims for `username`, expiring `exp_offset_secs` from now
pub fn remote_claims(username: &str, exp_offset_secs: i64) -> Value {
    let now = current_timestamp();
    json!({
        "sub": format!("sub-{username}"),
        "preferred_username": username,
        "iss": "https://idp.example.com",
        "iat": now,
        "exp": (now as i64 + exp_offset_secs) as u64,
    })
}

/// Identity store wrapper that counts builds and can be told to fail
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryIdentityStore,
    builds: AtomicUsize,
    session_checks: AtomicUsize,
    failing: AtomicBool,
    build_delay: Option<Duration>,
    last_init: Mutex<Option<IdentityInit>>,
}

impl CountingStore {
    /// A store knowing `alice` (U1) and `guest` (G1), both logged in
    pub async fn with_users() -> Self {
        let store = Self::default();
        store.seed().await;
        store
    }

    /// Like [`CountingStore::with_users`], with slow builds
    pub async fn slow(build_delay: Duration) -> Self {
        let store = Self {
            build_delay: Some(build_delay),
            ..Self::default()
        };
        store.seed().await;
        store
    }

    async fn seed(&self) {
        self.inner
            .insert_user(Identity::new("U1", "alice", UserStatus::Valid).with_locale("en-GB"))
            .await;
        self.inner
            .insert_user(Identity::new("G1", "guest", UserStatus::Valid))
            .await;
        self.inner.record_login("alice").await;
        self.inner.record_login("guest").await;
    }

    /// The wrapped store (login/logout tracking)
    pub fn memory(&self) -> &MemoryIdentityStore {
        &self.inner
    }

    /// Number of `build_identity` calls so far
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Number of `check_session_active` calls so far
    pub fn session_checks(&self) -> usize {
        self.session_checks.load(Ordering::SeqCst)
    }

    /// Make every build fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The init payload of the most recent build
    pub async fn last_init(&self) -> Option<IdentityInit> {
        self.last_init.lock().await.clone()
    }
}

#[async_trait]
impl IdentityStore for CountingStore {
    async fn build_identity(&self, init: IdentityInit) -> Result<Identity, IdentityStoreError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        *self.last_init.lock().await = Some(init.clone());

        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(IdentityStoreError::Unavailable("store offline".to_string()));
        }

        self.inner.build_identity(init).await
    }

    async fn check_session_active(&self, username: &str) -> Result<bool, IdentityStoreError> {
        self.session_checks.fetch_add(1, Ordering::SeqCst);
        self.inner.check_session_active(username).await
    }
}

/// Shared handle to a [`CountingStore`]
pub async fn counting_store() -> Arc<CountingStore> {
    Arc::new(CountingStore::with_users().await)
}
