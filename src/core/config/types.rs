use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) provider: ProviderKind,
    pub(super) gemini: GeminiSettings,
    pub(super) ollama: OllamaSettings,
    pub(super) run: RunSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct GeminiSettings {
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) temperature: f64,
    pub(crate) max_retries: u32,
    pub(crate) retry_delay_seconds: f64,
    pub(crate) request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct OllamaSettings {
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) temperature: f64,
    pub(crate) max_tokens: u32,
    pub(crate) max_retries: u32,
    pub(crate) retry_delay_seconds: f64,
    pub(crate) request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub(crate) rate_limit_seconds: f64,
    pub(crate) output_dir: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) metrics_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProviderKind {
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "hosted" => Ok(Self::Gemini),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(ConfigError::InvalidProvider(other.to_string())),
        }
    }
}

/// Upper bound for every configurable pause (rate limit, retry delay).
pub(crate) const MAX_DELAY_SECONDS: f64 = 86_400.0;

/// A pause must be a finite number of seconds in `[0, MAX_DELAY_SECONDS]`.
pub(crate) fn is_valid_delay(seconds: f64) -> bool {
    seconds.is_finite() && (0.0..=MAX_DELAY_SECONDS).contains(&seconds)
}

/// Retry budget for one question: total attempts and the flat pause between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) retry_delay: Duration,
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("unknown provider '{0}' (expected 'gemini' or 'ollama')")]
    InvalidProvider(String),
    #[error("missing required secret for {0}; set it with: export {0}='your-api-key'")]
    MissingSecret(&'static str),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl GeminiSettings {
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs_f64(self.retry_delay_seconds),
        }
    }
}

impl OllamaSettings {
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs_f64(self.retry_delay_seconds),
        }
    }
}
