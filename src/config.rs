use std::env;

use anyhow::{anyhow, Context, Result};

use crate::prompt::PromptVersion;
use crate::rate_limit::{RateLimitPolicy, DEFAULT_MAX_TRACKED_KEYS};
use crate::upstream::GeminiDefinition;

/// Where the provider credential comes from.  Resolved per request so a key
/// rotated into the environment is picked up without a restart.
#[derive(Clone)]
pub enum ApiKeySource {
    Env(String),
    Fixed(Option<String>),
}

impl ApiKeySource {
    /// The key, if configured and non-blank.
    pub fn resolve(&self) -> Option<String> {
        let raw = match self {
            ApiKeySource::Env(var) => env::var(var).ok(),
            ApiKeySource::Fixed(value) => value.clone(),
        };
        raw.filter(|k| !k.trim().is_empty())
    }

    /// Human-readable origin, safe to log.
    pub fn describe(&self) -> String {
        match self {
            ApiKeySource::Env(var) => var.clone(),
            ApiKeySource::Fixed(_) => "<fixed>".to_string(),
        }
    }
}

impl std::fmt::Debug for ApiKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKeySource({})", self.describe())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream: GeminiDefinition,
    pub api_key: ApiKeySource,
    pub rate_limit: RateLimitPolicy,
    pub rate_max_keys: usize,
    pub client_ip_header: String,
    pub prompt_version: PromptVersion,
    pub max_request_bytes: usize,
}

pub const DEFAULT_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_CLIENT_IP_HEADER: &str = "cf-connecting-ip";
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: GeminiDefinition::default(),
            api_key: ApiKeySource::Env(DEFAULT_API_KEY_VAR.to_string()),
            rate_limit: RateLimitPolicy::default(),
            rate_max_keys: DEFAULT_MAX_TRACKED_KEYS,
            client_ip_header: DEFAULT_CLIENT_IP_HEADER.to_string(),
            prompt_version: PromptVersion::default(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let upstream = GeminiDefinition {
            base_url: parse_string_env("BUZZ_UPSTREAM_BASE_URL")?
                .unwrap_or(defaults.upstream.base_url),
            model: parse_string_env("BUZZ_MODEL")?.unwrap_or(defaults.upstream.model),
            timeout_ms: parse_optional_u64("BUZZ_UPSTREAM_TIMEOUT_MS")?
                .unwrap_or(defaults.upstream.timeout_ms),
        };

        let api_key = parse_string_env("BUZZ_API_KEY_VAR")?
            .map(ApiKeySource::Env)
            .unwrap_or(defaults.api_key);

        let limit = parse_nonzero_u64("BUZZ_RATE_LIMIT")?
            .map(|v| u32::try_from(v).map_err(|_| anyhow!("BUZZ_RATE_LIMIT is too large")))
            .transpose()?
            .unwrap_or(defaults.rate_limit.limit);
        let window_secs = parse_nonzero_u64("BUZZ_RATE_WINDOW_SECS")?
            .map(|v| i64::try_from(v).map_err(|_| anyhow!("BUZZ_RATE_WINDOW_SECS is too large")))
            .transpose()?;
        let window = match window_secs {
            Some(secs) => chrono::Duration::try_seconds(secs)
                .context("BUZZ_RATE_WINDOW_SECS is out of range")?,
            None => defaults.rate_limit.window,
        };

        let rate_max_keys = parse_optional_u64("BUZZ_RATE_MAX_KEYS")?
            .map(|v| v as usize)
            .unwrap_or(defaults.rate_max_keys);
        let client_ip_header = parse_string_env("BUZZ_CLIENT_IP_HEADER")?
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or(defaults.client_ip_header);
        axum::http::HeaderName::from_bytes(client_ip_header.as_bytes())
            .with_context(|| format!("BUZZ_CLIENT_IP_HEADER '{}' is not a valid header name", client_ip_header))?;

        let prompt_version = match parse_string_env("BUZZ_PROMPT_VERSION")? {
            Some(raw) => raw
                .parse::<PromptVersion>()
                .map_err(|e| anyhow!("BUZZ_PROMPT_VERSION: {}", e))?,
            None => defaults.prompt_version,
        };
        let max_request_bytes = parse_optional_u64("BUZZ_MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(defaults.max_request_bytes);

        Ok(Self {
            upstream,
            api_key,
            rate_limit: RateLimitPolicy { limit, window },
            rate_max_keys,
            client_ip_header,
            prompt_version,
            max_request_bytes,
        })
    }
}

fn parse_string_env(var: &str) -> Result<Option<String>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("{} is not valid unicode", var)),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match parse_string_env(var)? {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        None => Ok(None),
    }
}

fn parse_nonzero_u64(var: &str) -> Result<Option<u64>> {
    match parse_optional_u64(var)? {
        Some(0) => Err(anyhow!("{} must be greater than zero", var)),
        other => Ok(other),
    }
}
