use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::{ConfigError, ProviderKind, Settings};
use crate::services::{gemini::GeminiClient, ollama::OllamaClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProviderErrorKind {
    Timeout,
    ConnectionRefused,
    AuthFailure,
    RateLimited,
    Unknown,
}

impl ProviderErrorKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{} error: {message}", kind.as_str())]
pub(crate) struct ProviderError {
    pub(crate) kind: ProviderErrorKind,
    pub(crate) message: String,
}

impl ProviderError {
    pub(crate) fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub(crate) fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::AuthFailure, message)
    }

    pub(crate) fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }

    /// Errors that must stop the whole run instead of being retried.
    pub(crate) fn is_fatal(&self) -> bool {
        self.kind == ProviderErrorKind::AuthFailure
    }

    pub(crate) fn from_transport(err: reqwest::Error, backend: &str) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_connect() {
            ProviderErrorKind::ConnectionRefused
        } else {
            ProviderErrorKind::Unknown
        };
        Self::new(kind, format!("{backend} request failed: {err}"))
    }
}

/// Text-in, text-out access to one LLM backend. Implementations do network
/// I/O only; retries live in the grading task.
#[async_trait]
pub(crate) trait GradingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// One-time check before the run starts.
    async fn ensure_ready(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

pub(crate) fn build_provider(settings: &Settings) -> Result<Box<dyn GradingProvider>, ConfigError> {
    match settings.provider() {
        ProviderKind::Gemini => Ok(Box::new(GeminiClient::from_settings(settings.gemini())?)),
        ProviderKind::Ollama => Ok(Box::new(OllamaClient::from_settings(settings.ollama())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn only_auth_failures_are_fatal() {
        assert!(ProviderError::auth("bad key").is_fatal());
        for kind in [
            ProviderErrorKind::Timeout,
            ProviderErrorKind::ConnectionRefused,
            ProviderErrorKind::RateLimited,
            ProviderErrorKind::Unknown,
        ] {
            assert!(!ProviderError::new(kind, "transient").is_fatal());
        }
    }

    #[test]
    fn display_names_the_kind() {
        let err = ProviderError::new(ProviderErrorKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "rate_limited error: slow down");
    }

    #[test]
    fn hosted_provider_requires_api_key() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let err = build_provider(&settings).err().expect("missing key");
        assert!(matches!(err, ConfigError::MissingSecret("GEMINI_API_KEY")));
    }

    #[test]
    fn provider_follows_selected_backend() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("GEMINI_API_KEY", "test-key");

        let settings = Settings::load().expect("settings");
        std::env::remove_var("GEMINI_API_KEY");

        let hosted = build_provider(&settings).expect("gemini");
        assert_eq!(hosted.name(), "gemini");
        assert_eq!(hosted.model(), "gemini-2.5-flash");

        let local = build_provider(&settings.with_provider(ProviderKind::Ollama)).expect("ollama");
        assert_eq!(local.name(), "ollama");
        assert_eq!(local.model(), "llama3.1:8b");
    }
}
