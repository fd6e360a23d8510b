//! Environment-driven configuration.
//!
//! `main` loads `.env` through `dotenvy` and hands [`std::env::var`] to
//! [`AppConfig::from_lookup`]; tests pass a map instead.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    /// Where checkout and the billing portal send the browser back to.
    pub app_base_url: String,
    pub stripe: StripeConfig,
    pub openai: OpenAiConfig,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Insights fall back to canned copy when no key is set.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: parsed(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3050)))?,
            database_max_connections: parsed(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            run_migrations: parsed(&get, "RUN_MIGRATIONS", true)?,
            app_base_url: get("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            stripe: StripeConfig {
                secret_key: required("STRIPE_SECRET_KEY")?,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
                price_id: required("STRIPE_PRICE_ID")?,
                api_base: get("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
            },
            openai: OpenAiConfig {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
                api_base: get("OPENAI_API_BASE")
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            },
            http_timeout: Duration::from_secs(parsed(&get, "HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}

fn parsed<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
