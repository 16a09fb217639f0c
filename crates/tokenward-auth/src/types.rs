//! Core identity types
//!
//! This module contains the application-level identity resolved from a
//! verified token, and the payload handed to the identity store to build it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::claims::Claims;

/// Account status of an application user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Active account
    Valid,
    /// Account switched off by an administrator
    Disabled,
    /// Account locked (e.g. too many failed logins)
    Locked,
}

impl UserStatus {
    /// Wire representation used in the `status` claim
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Valid => "VALID",
            UserStatus::Disabled => "DISABLED",
            UserStatus::Locked => "LOCKED",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved application identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique user id
    pub user_id: String,
    /// Username (cache key)
    pub username: String,
    /// Account status
    pub status: UserStatus,
    /// Preferred locale, e.g. `en` or `de-CH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Additional context attached by the identity store
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Identity {
    /// Create an identity without extra attributes
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, status: UserStatus) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            status,
            locale: None,
            attributes: HashMap::new(),
        }
    }

    /// Set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Attach an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Language part of the locale (`de` for `de-CH`)
    pub fn language(&self) -> Option<&str> {
        self.locale
            .as_deref()
            .and_then(|locale| locale.split(['-', '_']).next())
            .filter(|lang| !lang.is_empty())
    }
}

/// What the identity store builds an identity from
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityInit {
    /// Only the username is known
    Username(String),
    /// The full verified claim set
    Claims(Claims),
}

impl IdentityInit {
    /// Username the identity is being built for, if it can be determined
    pub fn username(&self) -> Option<&str> {
        match self {
            IdentityInit::Username(username) => Some(username),
            IdentityInit::Claims(claims) => claims.username(),
        }
    }
}
