use color_eyre::eyre::{eyre, WrapErr};
use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use crate::util::mask_secret;

pub const DEFAULT_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";

/// Which eBay deployment the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api.sandbox.ebay.com",
            Self::Production => "https://api.ebay.com",
        }
    }
}

impl FromStr for Environment {
    type Err = color_eyre::eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            other => Err(eyre!(
                "unknown EBAY_ENVIRONMENT `{other}`, expected `sandbox` or `production`"
            )),
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub environment: Environment,
    /// Identity and catalog base URL. Defaults to the environment's host.
    pub api_base_url: String,
    pub scope: String,
    pub marketplace_id: String,
    pub upstream_timeout: Duration,
    pub token_refresh_margin: chrono::Duration,
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub lookup_cache_ttl: Duration,
}

impl Settings {
    /// Reads the settings from the process environment.
    /// `dotenvy` is expected to have been loaded by the caller.
    pub fn from_env() -> color_eyre::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> color_eyre::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| eyre!("missing required environment variable {key}"))
        };

        let environment: Environment = lookup("EBAY_ENVIRONMENT")
            .map_or(Ok(Environment::Production), |v| v.parse())?;

        Ok(Self {
            client_id: required("EBAY_CLIENT_ID")?,
            client_secret: required("EBAY_CLIENT_SECRET")?,
            environment,
            api_base_url: lookup("EBAY_API_BASE_URL")
                .unwrap_or_else(|| environment.base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            scope: lookup("EBAY_OAUTH_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            marketplace_id: lookup("EBAY_MARKETPLACE_ID").unwrap_or_else(|| "EBAY_US".to_string()),
            upstream_timeout: Duration::from_secs(parse_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 10)?),
            token_refresh_margin: refresh_margin(parse_or(
                &lookup,
                "TOKEN_REFRESH_MARGIN_SECS",
                60,
            )?)?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://wishlist.db".to_string()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 5000)))?,
            lookup_cache_ttl: Duration::from_secs(parse_or(&lookup, "LOOKUP_CACHE_TTL_SECS", 60)?),
        })
    }

    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/identity/v1/oauth2/token", self.api_base_url)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask_secret(&self.client_secret))
            .field("environment", &self.environment)
            .field("api_base_url", &self.api_base_url)
            .field("scope", &self.scope)
            .field("marketplace_id", &self.marketplace_id)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("token_refresh_margin", &self.token_refresh_margin)
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("bind_addr", &self.bind_addr)
            .field("lookup_cache_ttl", &self.lookup_cache_ttl)
            .finish()
    }
}

fn refresh_margin(secs: u64) -> color_eyre::Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| eyre!("TOKEN_REFRESH_MARGIN_SECS is out of range: {secs}"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> color_eyre::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .wrap_err_with(|| format!("invalid value for {key}: `{raw}`")),
        None => Ok(default),
    }
}
