//! tokenward demo CLI
//!
//! Loads security settings from a file (or defaults), seeds an in-memory
//! identity store from `--user` flags and runs one token operation.
//! Tokens and identities go to stdout, logs to stderr.
//!
//! ```text
//! tokenward-demo --key "$KEY" --user alice:U1 issue alice
//! tokenward-demo --key "$KEY" --user alice:U1 authenticate <token>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokenward_auth::{
    Identity, MemoryIdentityStore, SecurityFacade, SecuritySettings, TokenCheck, UserStatus,
};
use tokenward_telemetry::TelemetryConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tokenward-demo",
    version,
    about = "Issue, validate and authenticate tokens with tokenward"
)]
struct Cli {
    /// Settings file (TOML, YAML, JSON or .properties); defaults apply otherwise
    #[arg(long, short = 'c', env = "TOKENWARD_CONFIG")]
    config: Option<PathBuf>,

    /// BASE64 HMAC key, overriding the settings file
    #[arg(long, env = "TOKENWARD_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Known user as `username:user_id[:locale]`; repeatable
    #[arg(long = "user", short = 'u', value_parser = parse_user)]
    users: Vec<Identity>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log level filter
    #[arg(long, global = true, default_value = "warn,tokenward_auth=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a local token for a seeded user
    Issue {
        /// Username given with `--user`
        username: String,
    },
    /// Check a token and print its claims
    Validate {
        /// Compact JWT
        token: String,
    },
    /// Check a token and print the resolved identity
    Authenticate {
        /// Compact JWT
        token: String,
    },
}

fn parse_user(raw: &str) -> Result<Identity, String> {
    let mut parts = raw.splitn(3, ':');
    let (Some(username), Some(user_id)) = (parts.next(), parts.next()) else {
        return Err(format!("expected username:user_id, got '{raw}'"));
    };
    if username.is_empty() || user_id.is_empty() {
        return Err(format!("expected username:user_id, got '{raw}'"));
    }

    let identity = Identity::new(user_id, username, UserStatus::Valid);
    Ok(match parts.next() {
        Some(locale) if !locale.is_empty() => identity.with_locale(locale),
        _ => identity,
    })
}

fn load_settings(cli: &Cli) -> Result<SecuritySettings> {
    let mut settings = match &cli.config {
        Some(path) => SecuritySettings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => SecuritySettings::default(),
    };
    if let Some(key) = &cli.key {
        settings.token_key = Some(SecretString::new(key.clone()));
    }
    Ok(settings)
}

async fn seeded_store(users: &[Identity]) -> Arc<MemoryIdentityStore> {
    let store = MemoryIdentityStore::shared();
    for user in users {
        store.insert_user(user.clone()).await;
        store.record_login(&user.username).await;
    }
    store
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _telemetry = TelemetryConfig::builder()
        .service_name("tokenward-demo")
        .log_level(cli.log_level.clone())
        .json_logs(cli.json_logs)
        .stderr_output(true)
        .build()
        .init()?;

    let settings = load_settings(&cli)?;
    let store = seeded_store(&cli.users).await;
    let facade = SecurityFacade::new(settings, store)?;
    tracing::debug!(strategy = ?facade.strategy().kind(), "facade ready");

    match &cli.command {
        Command::Issue { username } => {
            let Some(identity) = cli.users.iter().find(|u| &u.username == username) else {
                bail!("unknown user '{username}'; seed it with --user {username}:<id>");
            };
            let token = facade
                .issue_token(Some(identity))?
                .context("no token issued")?;
            println!("{token}");
        }
        Command::Validate { token } => match facade.check_token(token).await {
            TokenCheck::Disabled => println!("token checking is disabled"),
            TokenCheck::Rejected(error) => bail!("token rejected ({}): {error}", error.category()),
            TokenCheck::Accepted(claims) => {
                println!("{}", serde_json::to_string_pretty(&claims)?);
            }
        },
        Command::Authenticate { token } => match facade.authenticate(token).await? {
            Some(identity) => println!("{}", serde_json::to_string_pretty(identity.as_ref())?),
            None => println!("anonymous"),
        },
    }

    facade.shutdown().await;
    Ok(())
}
