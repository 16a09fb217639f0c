//! # Tokenward Auth - Token Engine and Identity Resolution
//!
//! Issues and verifies signed identity tokens, validates federated (OIDC)
//! tokens against a rotating JWKS, and resolves verified tokens into cached
//! application identities while enforcing a live-session invariant.
//!
//! ## Design Principles
//!
//! - **One Entry Point**: [`SecurityFacade`] is the seam callers depend on
//! - **Strategy Chosen Once**: local (HS512) or remote (RS256 + JWKS), fixed at build time
//! - **Claims Only From Verification**: [`Claims`] cannot be constructed by callers
//! - **Explicit Algorithm Allow-Lists**: `none` and unexpected algorithms are always rejected
//!
//! ## Architecture
//!
//! - [`facade`] - `SecurityFacade`, `TokenStrategy`, `TokenCheck`
//! - [`jwt`] - local codec, remote validator, JWKS client, authorized-party check
//! - [`identity`] - identity cache (single-flight build-on-miss) and resolver
//! - [`session`] - session liveness guard
//! - [`store`] - identity store contract and in-memory implementation
//! - [`claims`] - verified claim set
//! - [`config`] - settings (dotted properties, files, environment)
//! - [`server`] - `Token` header extraction
//!
//! ## Quick Start
//!
//! ```rust
//! use tokenward_auth::{Identity, MemoryIdentityStore, SecurityFacade, SecuritySettings, UserStatus};
//!
//! # tokio_test::block_on(async {
//! let settings = SecuritySettings::from_properties([
//!     ("security.token.key", "dG9rZW53YXJkLWRlbW8tc2lnbmluZy1rZXktMDEyMzQ1Njc4OS1hYmNkZWZnaGlqa2xtbm9wcXJzdHV2d3h5eiE="),
//!     ("security.timeout", "60000"),
//! ])?;
//!
//! let store = MemoryIdentityStore::shared();
//! store.insert_user(Identity::new("U1", "alice", UserStatus::Valid)).await;
//!
//! let facade = SecurityFacade::new(settings, store)?;
//! let alice = Identity::new("U1", "alice", UserStatus::Valid);
//! let token = facade.issue_token(Some(&alice))?.unwrap();
//!
//! let identity = facade.authenticate(&token).await?.unwrap();
//! assert_eq!(identity.user_id, "U1");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Standards
//!
//! - **RFC 7519** - JSON Web Token (JWT)
//! - **RFC 7517** - JSON Web Key (JWK)
//! - **RFC 7518** - HS512 and RS256
//! - **OpenID Connect Core** - `azp` claim

pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod facade;
pub mod identity;
pub mod jwt;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

#[doc(inline)]
pub use claims::{Audience, Claims};
#[doc(inline)]
pub use clock::{Clock, SystemClock, TestClock};
#[doc(inline)]
pub use config::{ConfigError, SecuritySettings, StrategyKind};
#[doc(inline)]
pub use error::{SecurityError, SecurityResult};
#[doc(inline)]
pub use facade::{SecurityFacade, SecurityFacadeBuilder, TokenCheck, TokenStrategy};
#[doc(inline)]
pub use identity::{IdentityCache, IdentityResolver, ResolverOptions};
#[doc(inline)]
pub use server::{TOKEN_HEADER, token_from_headers};
#[doc(inline)]
pub use session::SessionGuard;
#[doc(inline)]
pub use store::{IdentityStore, IdentityStoreError, MemoryIdentityStore};
#[doc(inline)]
pub use types::{Identity, IdentityInit, UserStatus};
