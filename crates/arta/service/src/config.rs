//! Environment-driven configuration.
//!
//! Secrets (the auth secret, provider API keys) are read here and never
//! logged; `Debug` on [`Config`] elides them.

use std::time::Duration;

use arta_providers::ProviderName;
use thiserror::Error;

/// Conventional database URL variable names, checked in order.
const DATABASE_ENV_VARS: [&str; 3] = ["DATABASE_URL", "POSTGRES_URL", "PG_URL"];

/// Vector dimension when an external embedding provider is configured.
pub const EXTERNAL_EMBEDDING_DIM: usize = 1536;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {variable}: {message}")]
    InvalidVar {
        variable: &'static str,
        message: String,
    },
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub auth_secret: String,
    pub database_url: Option<String>,
    pub default_chat_provider: ProviderName,
    pub default_embed_provider: ProviderName,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_configured", &self.database_url.is_some())
            .field("default_chat_provider", &self.default_chat_provider)
            .field("default_embed_provider", &self.default_embed_provider)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_secret = std::env::var("AUTH_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingVar("AUTH_SECRET"))?;

        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
                variable: "PORT",
                message: format!("`{raw}` is not a port number"),
            })?,
            Err(_) => 8080,
        };

        let database_url = DATABASE_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));

        let default_chat_provider = provider_from_env("DEFAULT_MODEL_PROVIDER")?;
        let default_embed_provider = provider_from_env("DEFAULT_EMBEDDING_PROVIDER")?;

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidVar {
                    variable: "REQUEST_TIMEOUT_SECS",
                    message: format!("`{raw}` is not a number of seconds"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => arta_governor::DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(Self {
            port,
            auth_secret,
            database_url,
            default_chat_provider,
            default_embed_provider,
            request_timeout,
        })
    }

    /// Deterministic configuration for tests and local runs.
    pub fn for_tests(auth_secret: &str) -> Self {
        Self {
            port: 0,
            auth_secret: auth_secret.to_string(),
            database_url: None,
            default_chat_provider: ProviderName::OpenAi,
            default_embed_provider: ProviderName::OpenAi,
            request_timeout: Duration::from_secs(5),
        }
    }
}

fn provider_from_env(variable: &'static str) -> Result<ProviderName, ConfigError> {
    match std::env::var(variable) {
        Ok(raw) => ProviderName::parse(&raw).ok_or(ConfigError::InvalidVar {
            variable,
            message: format!("`{raw}` is not a known provider"),
        }),
        Err(_) => Ok(ProviderName::OpenAi),
    }
}
