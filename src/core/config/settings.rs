use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_seconds, parse_u32, parse_u64, trim_base_url,
};
use super::types::{
    ConfigError, GeminiSettings, OllamaSettings, ProviderKind, RetryPolicy, RunSettings, Settings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let provider = ProviderKind::parse(&env_or_default("AUTOGRADER_PROVIDER", "gemini"))?;

        let gemini_api_key = env_optional("GEMINI_API_KEY");
        let gemini_base_url = trim_base_url(env_or_default(
            "GEMINI_BASE_URL",
            "https://generativelanguage.googleapis.com/v1beta",
        ));
        let gemini_model = env_or_default("GEMINI_MODEL", "gemini-2.5-flash");
        let gemini_max_retries =
            parse_u32("GEMINI_MAX_RETRIES", env_or_default("GEMINI_MAX_RETRIES", "3"))?;
        let gemini_retry_delay = parse_seconds(
            "GEMINI_RETRY_DELAY_SECONDS",
            env_or_default("GEMINI_RETRY_DELAY_SECONDS", "2.0"),
        )?;
        let gemini_timeout =
            parse_u64("GEMINI_TIMEOUT_SECONDS", env_or_default("GEMINI_TIMEOUT_SECONDS", "120"))?;

        let ollama_base_url =
            trim_base_url(env_or_default("OLLAMA_BASE_URL", "http://localhost:11434"));
        let ollama_model = env_or_default("OLLAMA_MODEL", "llama3.1:8b");
        let ollama_max_tokens =
            parse_u32("OLLAMA_MAX_TOKENS", env_or_default("OLLAMA_MAX_TOKENS", "4096"))?;
        let ollama_max_retries =
            parse_u32("OLLAMA_MAX_RETRIES", env_or_default("OLLAMA_MAX_RETRIES", "3"))?;
        let ollama_retry_delay = parse_seconds(
            "OLLAMA_RETRY_DELAY_SECONDS",
            env_or_default("OLLAMA_RETRY_DELAY_SECONDS", "2.0"),
        )?;
        let ollama_timeout =
            parse_u64("OLLAMA_TIMEOUT_SECONDS", env_or_default("OLLAMA_TIMEOUT_SECONDS", "300"))?;

        let rate_limit_seconds = parse_seconds(
            "AUTOGRADER_RATE_LIMIT_SECONDS",
            env_or_default("AUTOGRADER_RATE_LIMIT_SECONDS", "1.0"),
        )?;
        let output_dir = env_or_default("AUTOGRADER_OUTPUT_DIR", "output");

        let log_level = env_or_default("AUTOGRADER_LOG_LEVEL", "info");
        let json =
            env_optional("AUTOGRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let metrics_file = env_optional("AUTOGRADER_METRICS_FILE");

        let settings = Self {
            provider,
            gemini: GeminiSettings {
                api_key: gemini_api_key,
                base_url: gemini_base_url,
                model: gemini_model,
                temperature: 0.0,
                max_retries: gemini_max_retries,
                retry_delay_seconds: gemini_retry_delay,
                request_timeout_seconds: gemini_timeout,
            },
            ollama: OllamaSettings {
                base_url: ollama_base_url,
                model: ollama_model,
                temperature: 0.0,
                max_tokens: ollama_max_tokens,
                max_retries: ollama_max_retries,
                retry_delay_seconds: ollama_retry_delay,
                request_timeout_seconds: ollama_timeout,
            },
            run: RunSettings { rate_limit_seconds, output_dir },
            telemetry: TelemetrySettings { log_level, json, metrics_file },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub(crate) fn gemini(&self) -> &GeminiSettings {
        &self.gemini
    }

    pub(crate) fn ollama(&self) -> &OllamaSettings {
        &self.ollama
    }

    pub(crate) fn run(&self) -> &RunSettings {
        &self.run
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    /// Model name of the selected backend.
    pub(crate) fn model(&self) -> &str {
        match self.provider {
            ProviderKind::Gemini => &self.gemini.model,
            ProviderKind::Ollama => &self.ollama.model,
        }
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        match self.provider {
            ProviderKind::Gemini => self.gemini.retry_policy(),
            ProviderKind::Ollama => self.ollama.retry_policy(),
        }
    }

    pub(crate) fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Overrides the model of the currently selected backend only.
    pub(crate) fn with_model(mut self, model: &str) -> Self {
        let model = model.trim();
        if model.is_empty() {
            return self;
        }
        match self.provider {
            ProviderKind::Gemini => self.gemini.model = model.to_string(),
            ProviderKind::Ollama => self.ollama.model = model.to_string(),
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GEMINI_MAX_RETRIES",
                value: "0".to_string(),
            });
        }
        if self.ollama.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "OLLAMA_MAX_RETRIES",
                value: "0".to_string(),
            });
        }
        if self.ollama.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "OLLAMA_MAX_TOKENS",
                value: "0".to_string(),
            });
        }
        if self.gemini.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GEMINI_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }
        if self.ollama.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "OLLAMA_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }
        if self.run.output_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "AUTOGRADER_OUTPUT_DIR",
                value: String::from("<empty>"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support;

    #[test]
    fn load_uses_documented_defaults() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.provider(), ProviderKind::Gemini);
        assert_eq!(settings.gemini().model, "gemini-2.5-flash");
        assert_eq!(settings.gemini().temperature, 0.0);
        assert_eq!(settings.ollama().base_url, "http://localhost:11434");
        assert_eq!(settings.ollama().max_tokens, 4096);
        assert_eq!(settings.ollama().request_timeout_seconds, 300);
        assert_eq!(settings.run().rate_limit_seconds, 1.0);
        assert_eq!(
            settings.retry_policy(),
            RetryPolicy { max_retries: 3, retry_delay: Duration::from_secs(2) }
        );
    }

    #[test]
    fn load_rejects_zero_retries() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("OLLAMA_MAX_RETRIES", "0");

        let err = Settings::load().expect_err("zero retries");
        std::env::remove_var("OLLAMA_MAX_RETRIES");
        assert!(matches!(err, ConfigError::InvalidValue { field: "OLLAMA_MAX_RETRIES", .. }));
    }

    #[test]
    fn load_rejects_oversized_delays() {
        let _guard = test_support::env_lock();
        let fields = [
            "GEMINI_RETRY_DELAY_SECONDS",
            "OLLAMA_RETRY_DELAY_SECONDS",
            "AUTOGRADER_RATE_LIMIT_SECONDS",
        ];
        for field in fields {
            test_support::set_test_env();
            std::env::set_var(field, "1e20");

            let err = Settings::load().expect_err("oversized delay");
            std::env::remove_var(field);
            assert!(
                matches!(&err, ConfigError::InvalidValue { field: name, .. } if *name == field),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn load_rejects_unknown_provider() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("AUTOGRADER_PROVIDER", "claude");

        let err = Settings::load().expect_err("unknown provider");
        std::env::remove_var("AUTOGRADER_PROVIDER");
        assert!(matches!(err, ConfigError::InvalidProvider(name) if name == "claude"));
    }

    #[test]
    fn model_override_applies_to_selected_backend() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load()
            .expect("settings")
            .with_provider(ProviderKind::Ollama)
            .with_model("deepseek-r1:8b");
        assert_eq!(settings.model(), "deepseek-r1:8b");
        assert_eq!(settings.gemini().model, "gemini-2.5-flash");
    }

    #[test]
    fn provider_kind_accepts_aliases() {
        assert_eq!(ProviderKind::parse("Hosted").expect("alias"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::parse("local").expect("alias"), ProviderKind::Ollama);
        assert_eq!(ProviderKind::Ollama.as_str(), "ollama");
    }
}
