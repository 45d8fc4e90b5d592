//! Process-wide relay configuration
//!
//! Everything is read once at startup into an immutable [`RelayConfig`] that is
//! handed to the components needing it. Parsing goes through a lookup function
//! so tests can supply a map instead of mutating the process environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;

use crate::params::GenerationDefaults;
use crate::rate_limit::RateLimitConfig;
use crate::validator::ValidationLimits;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.mistral.ai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

const PLACEHOLDER_API_KEY: &str = "YOUR_MISTRAL_API_KEY_HERE";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, strum::EnumString, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum OperatingMode {
    #[strum(to_string = "development", serialize = "dev")]
    Development,
    #[strum(to_string = "production", serialize = "prod")]
    Production,
}

impl OperatingMode {
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Provider credential. Its `Debug` output never contains the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} still holds the placeholder value")]
    Placeholder(&'static str),
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: ApiKey,
    pub mode: OperatingMode,
    /// Empty means any origin, which is only accepted in development mode.
    pub allowed_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
    pub trust_proxy: bool,
    pub body_limit: usize,
    pub rate_limit: RateLimitConfig,
    pub limits: ValidationLimits,
    pub generation: GenerationDefaults,
}

impl RelayConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a required key is missing or a value
    /// cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("MISTRAL_API_KEY").ok_or(ConfigError::Missing("MISTRAL_API_KEY"))?;
        if api_key == PLACEHOLDER_API_KEY {
            return Err(ConfigError::Placeholder("MISTRAL_API_KEY"));
        }

        let mode = match get("APP_ENV") {
            Some(value) => parse_value("APP_ENV", &value)?,
            None => OperatingMode::Production,
        };

        let allowed_origins: Vec<String> = get("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(bad) = allowed_origins.iter().find(|origin| !is_serialized_origin(origin)) {
            return Err(invalid("ALLOWED_ORIGINS", bad, "expected scheme://host[:port]"));
        }
        if mode.is_production() && allowed_origins.is_empty() {
            return Err(ConfigError::Missing("ALLOWED_ORIGINS"));
        }

        let default_max_requests = if mode.is_production() { 100 } else { 1000 };
        let rate_limit = RateLimitConfig {
            max_requests: optional(&get, "RATE_LIMIT_MAX")?.unwrap_or(default_max_requests),
            window: Duration::from_secs(optional(&get, "RATE_LIMIT_WINDOW_SECS")?.unwrap_or(15 * 60)),
        };
        if rate_limit.max_requests == 0 {
            return Err(invalid("RATE_LIMIT_MAX", "0", "must be at least 1"));
        }
        if rate_limit.window.is_zero() {
            return Err(invalid("RATE_LIMIT_WINDOW_SECS", "0", "must be at least 1"));
        }

        let max_tokens_ceiling = optional(&get, "MAX_TOKENS_CEILING")?.unwrap_or(8000);
        if max_tokens_ceiling == 0 {
            return Err(invalid("MAX_TOKENS_CEILING", "0", "must be at least 1"));
        }

        let timeout_secs: u64 = optional(&get, "UPSTREAM_TIMEOUT_SECS")?.unwrap_or(30);
        if timeout_secs == 0 {
            return Err(invalid("UPSTREAM_TIMEOUT_SECS", "0", "must be at least 1"));
        }

        Ok(Self {
            api_key: ApiKey::new(api_key),
            mode,
            allowed_origins,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: optional(&get, "PORT")?.unwrap_or(DEFAULT_PORT),
            upstream_url: get("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            upstream_timeout: Duration::from_secs(timeout_secs),
            trust_proxy: optional(&get, "TRUST_PROXY")?.unwrap_or(false),
            body_limit: DEFAULT_BODY_LIMIT,
            rate_limit,
            limits: ValidationLimits::default(),
            generation: GenerationDefaults {
                model: get("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens_ceiling,
                ..GenerationDefaults::default()
            },
        })
    }
}

fn optional<T, G>(
    get: &G,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key).map(|value| parse_value(key, &value)).transpose()
}

/// Whether `origin` is written exactly as a browser sends it in `Origin`.
fn is_serialized_origin(origin: &str) -> bool {
    reqwest::Url::parse(origin).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https")
            && url.origin().ascii_serialization().eq_ignore_ascii_case(origin)
    })
}

fn parse_value<T>(
    key: &'static str,
    value: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn invalid(
    key: &'static str,
    value: &str,
    reason: &str,
) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
