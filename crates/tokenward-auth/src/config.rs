//! Security settings
//!
//! Settings can be built three ways:
//!
//! - [`SecuritySettings::from_properties`] from dotted `security.*` keys
//! - [`SecuritySettings::from_file`] from TOML, YAML, JSON or `.properties`
//! - in code, starting from [`SecuritySettings::default`]
//!
//! The token strategy follows from the settings: a JWKS URL
//! (`security.token.cert.url`) selects remote validation, otherwise tokens
//! are issued and validated locally with the HMAC key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::jwt::RetryPolicy;
use crate::jwt::local::{HmacKey, lifetime_from_millis};

/// Environment prefix for overrides, e.g. `TOKENWARD_TOKEN_KEY`
pub const ENV_PREFIX: &str = "TOKENWARD";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error(
        "Unsupported configuration file format. Use .toml, .yaml, .yml, .json or .properties"
    )]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A property has a value of the wrong shape
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Property name
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// The settings are inconsistent
    #[error("Invalid security settings: {0}")]
    Invalid(String),
}

/// Which validator the facade uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// HS512 tokens issued and checked with the shared key
    Local,
    /// RS256 tokens from an identity provider, checked against its JWKS
    Remote,
}

/// Security settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// `security.token`: token checking on/off
    pub token_enabled: bool,
    /// `security.token.key`: BASE64 HMAC key, at least 64 bytes decoded
    pub token_key: Option<SecretString>,
    /// `security.token.issuer`: `iss` of issued tokens
    pub token_issuer: String,
    /// `security.timeout`: token lifetime in ms; negative means no expiry
    pub timeout_ms: i64,
    /// `security.user.cache`
    pub user_cache: bool,
    /// `security.session.control`
    pub session_control: bool,
    /// `security.inituser.claims`: build identities from full claims
    pub init_user_from_claims: bool,
    /// `security.public.user`
    pub public_user: Option<String>,
    /// `security.token.cert.url`: JWKS endpoint; selects remote validation
    pub cert_url: Option<String>,
    /// `security.token.cert.timeout`: JWKS request timeout in ms
    pub cert_timeout_ms: u64,
    /// `security.token.cert.retries`: JWKS fetch attempts
    pub cert_retries: u32,
    /// `security.audience`
    pub audience: Option<String>,
    /// `security.authorized.party`: comma-separated client ids
    pub authorized_party: Option<String>,
    /// `security.clock.skew`: seconds of tolerance on remote `exp`
    pub clock_skew_secs: u64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            token_enabled: true,
            token_key: None,
            token_issuer: "tokenward".to_string(),
            timeout_ms: 3_600_000,
            user_cache: true,
            session_control: false,
            init_user_from_claims: false,
            public_user: None,
            cert_url: None,
            cert_timeout_ms: 10_000,
            cert_retries: 3,
            audience: None,
            authorized_party: None,
            clock_skew_secs: 0,
        }
    }
}

impl SecuritySettings {
    /// Build settings from dotted `security.*` keys
    ///
    /// Unknown `security.*` keys are logged and ignored; other keys are
    /// ignored silently. Blank values clear optional settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a boolean or number does not parse.
    pub fn from_properties<'a, I>(properties: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::default();

        for (key, value) in properties {
            let key = key.trim();
            let value = value.trim();

            match key {
                "security.token" => settings.token_enabled = parse_bool(key, value)?,
                "security.token.key" => {
                    settings.token_key = non_blank(value).map(|v| SecretString::new(v.to_string()));
                }
                "security.token.issuer" => settings.token_issuer = value.to_string(),
                "security.timeout" => settings.timeout_ms = parse_number(key, value)?,
                "security.user.cache" => settings.user_cache = parse_bool(key, value)?,
                "security.session.control" => settings.session_control = parse_bool(key, value)?,
                "security.inituser.claims" => {
                    settings.init_user_from_claims = parse_bool(key, value)?;
                }
                "security.public.user" => settings.public_user = non_blank(value).map(String::from),
                "security.token.cert.url" => settings.cert_url = non_blank(value).map(String::from),
                "security.token.cert.timeout" => {
                    settings.cert_timeout_ms = parse_number(key, value)?;
                }
                "security.token.cert.retries" => settings.cert_retries = parse_number(key, value)?,
                "security.audience" => settings.audience = non_blank(value).map(String::from),
                "security.authorized.party" => {
                    settings.authorized_party = non_blank(value).map(String::from);
                }
                "security.clock.skew" => settings.clock_skew_secs = parse_number(key, value)?,
                other if other.starts_with("security.") => {
                    warn!(key = other, "Ignoring unknown security property");
                }
                _ => {}
            }
        }

        Ok(settings)
    }

    /// Parse `key=value` lines (`#`/`!` comments, `=` or `:` separators)
    ///
    /// # Errors
    ///
    /// Same as [`SecuritySettings::from_properties`].
    pub fn from_properties_str(text: &str) -> Result<Self, ConfigError> {
        let pairs: Vec<(&str, &str)> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| {
                let split = line.find(['=', ':'])?;
                Some((&line[..split], &line[split + 1..]))
            })
            .collect();

        Self::from_properties(pairs)
    }

    /// Load settings from a file
    ///
    /// The format is auto-detected from the file extension:
    /// - `.toml`, `.yaml`/`.yml`, `.json` → field names as in this struct;
    ///   environment variables with the `TOKENWARD_` prefix override file
    ///   settings (for example `TOKENWARD_TOKEN_KEY`)
    /// - `.properties` → dotted `security.*` keys
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load settings from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`SecuritySettings::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            Some("properties") => {
                let text = std::fs::read_to_string(path)?;
                return Self::from_properties_str(&text);
            }
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = config.try_deserialize()?;
        debug!(path = %path.display(), strategy = ?settings.strategy(), "Loaded security settings");
        Ok(settings)
    }

    /// Check that the settings can be used to build a facade
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - local token checking is on but the key is missing or unusable
    /// - the JWKS URL is set but fetch attempts is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.strategy() {
            StrategyKind::Local if self.token_enabled => {
                let key = self.token_key.as_ref().ok_or_else(|| {
                    ConfigError::Invalid(
                        "security.token.key is required for local tokens".to_string(),
                    )
                })?;
                HmacKey::from_base64(key.expose_secret())
                    .map_err(|e| ConfigError::Invalid(format!("security.token.key: {e}")))?;
            }
            StrategyKind::Local => {}
            StrategyKind::Remote => {
                if self.cert_retries == 0 {
                    return Err(ConfigError::Invalid(
                        "security.token.cert.retries must be at least 1".to_string(),
                    ));
                }
            }
        }

        if self.audience.is_some() && self.authorized_party.is_some() {
            warn!("Both audience and authorized party set; authorized party is ignored");
        }

        Ok(())
    }

    /// The strategy these settings select
    pub fn strategy(&self) -> StrategyKind {
        match self.cert_url.as_deref().and_then(non_blank) {
            Some(_) => StrategyKind::Remote,
            None => StrategyKind::Local,
        }
    }

    /// Lifetime of issued tokens (`None` = no expiry)
    pub fn token_lifetime(&self) -> Option<Duration> {
        lifetime_from_millis(self.timeout_ms)
    }

    /// JWKS request timeout
    pub fn cert_timeout(&self) -> Duration {
        Duration::from_millis(self.cert_timeout_ms)
    }

    /// JWKS retry policy
    pub fn cert_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.cert_retries)
    }

    /// Tolerance on remote `exp`
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected true or false, got '{value}'"),
        }),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
