mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    is_valid_delay, ConfigError, GeminiSettings, OllamaSettings, ProviderKind, RetryPolicy,
    Settings, MAX_DELAY_SECONDS,
};
