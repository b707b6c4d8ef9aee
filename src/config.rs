//! Validated runtime settings.
//!
//! Settings come from the process environment, optionally seeded from a
//! `.env` file. Every value is checked once at startup; a bad value is a
//! [`ConfigError`], never a late runtime failure.

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use tracing::{Level, debug};

use crate::error::ConfigError;
use crate::service::Credential;

const ENDPOINT: &str = "AGENT_SERVICE_ENDPOINT";
const API_VERSION: &str = "AGENT_SERVICE_API_VERSION";
const API_KEY: &str = "AGENT_SERVICE_API_KEY";
const ACCESS_TOKEN: &str = "AGENT_SERVICE_ACCESS_TOKEN";
const DEPLOYMENT_NAME: &str = "AGENT_DEPLOYMENT_NAME";
const TIMEOUT_SECONDS: &str = "AGENT_TIMEOUT_SECONDS";
const POLL_INTERVAL_MS: &str = "AGENT_POLL_INTERVAL_MS";
const MAX_RETRIES: &str = "AGENT_MAX_RETRIES";
const MAX_TOKENS: &str = "AGENT_MAX_TOKENS";
const MAX_CONVERSATION_HISTORY: &str = "AGENT_MAX_CONVERSATION_HISTORY";
const LOG_LEVEL: &str = "AGENT_LOG_LEVEL";

#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: String,
    pub api_version: String,
    pub credential: Credential,
    pub deployment_name: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub max_tokens: u32,
    pub max_conversation_history: usize,
    pub log_level: Level,
}

impl Settings {
    /// Loads settings from the environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded environment file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let endpoint = get(ENDPOINT).ok_or(ConfigError::Missing(ENDPOINT))?;
        if !endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: ENDPOINT,
                message: "endpoint must use https".to_string(),
            });
        }
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let credential = match (get(API_KEY), get(ACCESS_TOKEN)) {
            (Some(key), _) => Credential::ApiKey(key),
            (None, Some(token)) => Credential::BearerToken(token),
            (None, None) => return Err(ConfigError::MissingCredential),
        };

        let log_level = match get(LOG_LEVEL) {
            None => Level::INFO,
            Some(raw) => Level::from_str(&raw).map_err(|_| ConfigError::Invalid {
                key: LOG_LEVEL,
                message: format!("unknown level '{raw}'"),
            })?,
        };

        Ok(Self {
            endpoint,
            api_version: get(API_VERSION).unwrap_or_else(|| "2024-07-01-preview".to_string()),
            credential,
            deployment_name: get(DEPLOYMENT_NAME).unwrap_or_else(|| "gpt-4o".to_string()),
            timeout: Duration::from_secs(ranged(&get, TIMEOUT_SECONDS, 300, 10..=600)?),
            poll_interval: Duration::from_millis(ranged(&get, POLL_INTERVAL_MS, 1000, 50..=60_000)?),
            max_retries: ranged(&get, MAX_RETRIES, 3, 0..=10)?,
            max_tokens: ranged(&get, MAX_TOKENS, 4000, 1..=128_000)?,
            max_conversation_history: ranged(&get, MAX_CONVERSATION_HISTORY, 20, 1..=100)?,
            log_level,
        })
    }
}

fn ranged<T, G>(get: &G, key: &'static str, default: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display,
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };

    let value = raw.parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        message: format!("'{raw}' is not a number"),
    })?;

    if !range.contains(&value) {
        return Err(ConfigError::Invalid {
            key,
            message: format!("{value} is outside {}..={}", range.start(), range.end()),
        });
    }

    Ok(value)
}
