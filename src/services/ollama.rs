use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::{ConfigError, OllamaSettings};
use crate::services::provider::{GradingProvider, ProviderError, ProviderErrorKind};

const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Locally served model behind an Ollama server.
#[derive(Debug, Clone)]
pub(crate) struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OllamaClient {
    pub(crate) fn from_settings(settings: &OllamaSettings) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|err| {
                ConfigError::ProviderUnavailable(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    fn not_running(&self) -> String {
        format!(
            "Ollama server not reachable at {}. Start it with: ollama serve. \
             Then pull the model with: ollama pull {}",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl GradingProvider for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    ProviderError::new(ProviderErrorKind::ConnectionRefused, self.not_running())
                } else {
                    ProviderError::from_transport(err, "Ollama")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::unknown(format!("Ollama returned {status}: {body}")));
        }

        let body: GenerateResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::from_transport(err, "Ollama")
            } else {
                ProviderError::unknown(format!("Ollama returned invalid JSON: {err}"))
            }
        })?;

        if body.response.trim().is_empty() {
            return Err(ProviderError::unknown("Ollama returned an empty response"));
        }
        Ok(body.response)
    }

    async fn ensure_ready(&self) -> Result<(), ConfigError> {
        let probe = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(READINESS_TIMEOUT)
            .send()
            .await;

        match probe {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    base_url = %self.base_url,
                    model = %self.model,
                    "Ollama server is ready"
                );
                Ok(())
            }
            Ok(response) => Err(ConfigError::ProviderUnavailable(format!(
                "Ollama readiness probe returned {}",
                response.status()
            ))),
            Err(_) => Err(ConfigError::ProviderUnavailable(self.not_running())),
        }
    }
}
