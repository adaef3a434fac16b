use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use config::{Config, Environment, File};

use secrecy::Secret;

use serde::Deserialize;
use serde_aux::prelude::*;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use url::Url;

use crate::domain::EmailAddress;
use crate::limiter::RateLimitPolicy;

/// Runtime environment, either `Dev` for local development, or `Prod` for release
#[derive(Debug)]
pub enum Runtime {
    Dev,
    Prod,
}

impl Runtime {
    pub fn as_str(&self) -> &str {
        match self {
            Runtime::Dev => "dev",
            Runtime::Prod => "prod",
        }
    }
}

impl TryFrom<String> for Runtime {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => anyhow::bail!("{} is not a valid runtime environment", other),
        }
    }
}

/// Application settings wrapper
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: ApplicationSettings,
    pub database: DatabaseSettings,
    pub email: EmailSettings,
    pub rate_limit: RateLimitSettings,
    pub tokens: TokenSettings,
}

impl Settings {
    /// Load application settings from the settings directory
    pub fn load() -> anyhow::Result<Self> {
        let path = env::current_dir()?.join("settings");
        // Defaults to `Dev` when `APP_ENV` is unset
        let runtime: Runtime = env::var("APP_ENV")
            .unwrap_or_else(|_| "dev".into())
            .try_into()?;

        Self::load_from(runtime, &path)
    }

    /// Load application settings from a specified path and runtime
    pub fn load_from(runtime: Runtime, base_path: &Path) -> anyhow::Result<Self> {
        Config::builder()
            .add_source(File::from(base_path.join("base")).required(true))
            .add_source(File::from(base_path.join(runtime.as_str())).required(true))
            // Takes the form `APP_<settings category>__<setting name>`, used for prod secrets
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
            .context("Failed to load/deserialize settings")
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    port: u16,

    secret_key: Secret<String>,
}

impl ApplicationSettings {
    /// The application address to bind to
    pub fn addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
    /// The key subscription tokens are digested with
    pub fn secret_key(&self) -> &Secret<String> {
        &self.secret_key
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    port: u16,
    host: String,
    name: String,
    username: String,
    password: Secret<String>,
    require_ssl: bool,
}

impl DatabaseSettings {
    /// The database connection options, without specifying the database name
    pub fn without_db(&self) -> PgConnectOptions {
        use secrecy::ExposeSecret;

        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .port(self.port)
            .host(&self.host)
            .ssl_mode(ssl_mode)
            .username(&self.username)
            .password(self.password.expose_secret())
    }
    /// The database connection options, with the database name
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailSettings {
    sender: String,
    api_base_url: String,
    api_auth_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    api_timeout_milliseconds: u64,
}

impl EmailSettings {
    /// The email address to send application emails from
    pub fn sender(&self) -> anyhow::Result<EmailAddress> {
        self.sender
            .parse()
            .context("Failed to parse email sender address")
    }
    /// The email REST API timeout duration
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_milliseconds)
    }
    /// The base URL for the email REST service
    pub fn api_base_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.api_base_url).context("Failed to parse email base URL")
    }
    /// The authentication token to include when making email requests
    pub fn api_auth_token(&self) -> Secret<String> {
        self.api_auth_token.clone()
    }
}

/// Named limiter capacities
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitProfile {
    Strict,
    Relaxed,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitSettings {
    profile: RateLimitProfile,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    duplicate_cooldown_seconds: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    sweep_interval_seconds: u64,
}

impl RateLimitSettings {
    pub fn policy(&self) -> RateLimitPolicy {
        let policy = match self.profile {
            RateLimitProfile::Strict => RateLimitPolicy::strict(),
            RateLimitProfile::Relaxed => RateLimitPolicy::relaxed(),
        };
        RateLimitPolicy {
            duplicate_cooldown: chrono::Duration::seconds(self.duplicate_cooldown_seconds),
            ..policy
        }
    }
    /// How often expired limiter entries are evicted
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Lifetimes of the tokens sent out in subscription emails
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    confirmation_ttl_hours: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    unsubscribe_ttl_days: i64,
}

impl TokenSettings {
    pub fn new(confirmation_ttl: chrono::Duration, unsubscribe_ttl: chrono::Duration) -> Self {
        Self {
            confirmation_ttl_hours: confirmation_ttl.num_hours(),
            unsubscribe_ttl_days: unsubscribe_ttl.num_days(),
        }
    }

    pub fn confirmation_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.confirmation_ttl_hours)
    }

    pub fn unsubscribe_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.unsubscribe_ttl_days)
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self::new(chrono::Duration::hours(48), chrono::Duration::days(365))
    }
}
