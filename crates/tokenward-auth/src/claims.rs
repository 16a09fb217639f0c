//! Verified token claims
//!
//! [`Claims`] can only be produced by the codecs in [`crate::jwt`] after the
//! token signature has been checked. There is no public constructor and no
//! public `Deserialize` implementation; the wire form is parsed into a
//! crate-private [`RawClaims`] first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Audience claim (RFC 7519 section 4.1.3): a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "app1"`
    Single(String),
    /// `"aud": ["app1", "app2"]`
    Many(Vec<String>),
}

impl Audience {
    /// Whether `candidate` is one of the audiences
    pub fn contains(&self, candidate: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == candidate,
            Audience::Many(auds) => auds.iter().any(|aud| aud == candidate),
        }
    }
}

/// Wire form of the claim set, as decoded from a token payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RawClaims {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub(crate) user_id: Option<String>,
    #[serde(rename = "userName", skip_serializing_if = "Option::is_none")]
    pub(crate) user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) iat: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) exp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) azp: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

/// The verified set of attributes carried inside a signed token
///
/// Immutable once constructed. Fields the engine does not model are kept
/// in [`Claims::extra`] in payload order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Claims {
    raw: RawClaims,
}

impl Claims {
    /// Wraps a payload whose signature has already been verified
    pub(crate) fn from_verified(raw: RawClaims) -> Self {
        Self { raw }
    }

    /// Application user id (`userId`)
    pub fn user_id(&self) -> Option<&str> {
        self.raw.user_id.as_deref()
    }

    /// Application username (`userName`)
    pub fn user_name(&self) -> Option<&str> {
        self.raw.user_name.as_deref()
    }

    /// User status as issued (`status`)
    pub fn status(&self) -> Option<&str> {
        self.raw.status.as_deref()
    }

    /// Preferred language (`lang`)
    pub fn lang(&self) -> Option<&str> {
        self.raw.lang.as_deref()
    }

    /// Issuer (`iss`)
    pub fn issuer(&self) -> Option<&str> {
        self.raw.iss.as_deref()
    }

    /// Subject (`sub`)
    pub fn subject(&self) -> Option<&str> {
        self.raw.sub.as_deref()
    }

    /// Token id (`jti`)
    pub fn id(&self) -> Option<&str> {
        self.raw.jti.as_deref()
    }

    /// Issued-at as seconds since the Unix epoch (`iat`)
    pub fn issued_at(&self) -> Option<u64> {
        self.raw.iat
    }

    /// Expiration as seconds since the Unix epoch (`exp`)
    pub fn expiration(&self) -> Option<u64> {
        self.raw.exp
    }

    /// OIDC preferred username (`preferred_username`)
    pub fn preferred_username(&self) -> Option<&str> {
        self.raw.preferred_username.as_deref()
    }

    /// Audience (`aud`)
    pub fn audience(&self) -> Option<&Audience> {
        self.raw.aud.as_ref()
    }

    /// Authorized party (`azp`)
    pub fn authorized_party(&self) -> Option<&str> {
        self.raw.azp.as_deref()
    }

    /// Claims not modelled above, in payload order
    pub fn extra(&self) -> &Map<String, Value> {
        &self.raw.extra
    }

    /// Look up an unmodelled claim by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.raw.extra.get(name)
    }

    /// The username identities are keyed by
    ///
    /// Local tokens carry `userName`; federated tokens carry
    /// `preferred_username`. `sub` is the last resort.
    pub fn username(&self) -> Option<&str> {
        self.user_name()
            .or_else(|| self.preferred_username())
            .or_else(|| self.subject())
    }
}
