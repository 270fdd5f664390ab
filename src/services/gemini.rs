use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::core::config::{ConfigError, GeminiSettings};
use crate::services::provider::{GradingProvider, ProviderError, ProviderErrorKind};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Hosted backend speaking the Gemini `generateContent` REST API.
#[derive(Debug, Clone)]
pub(crate) struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
}

impl GeminiClient {
    pub(crate) fn from_settings(settings: &GeminiSettings) -> Result<Self, ConfigError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingSecret("GEMINI_API_KEY"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|err| {
                ConfigError::ProviderUnavailable(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GradingProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let payload = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": self.temperature}
        });

        let timer = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::from_transport(err, "Gemini"))?;

        let status = response.status();
        let body =
            response.text().await.map_err(|err| ProviderError::from_transport(err, "Gemini"))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let body: Value = serde_json::from_str(&body)
            .map_err(|err| ProviderError::unknown(format!("Gemini returned invalid JSON: {err}")))?;
        let text = extract_text(&body)?;

        tracing::debug!(
            model = %self.model,
            duration_ms = timer.elapsed().as_millis() as u64,
            "Gemini response received"
        );
        Ok(text)
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("Gemini API returned {status}: {}", truncate(body, 300));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::auth(message),
        StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => ProviderError::auth(message),
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::new(ProviderErrorKind::RateLimited, message)
        }
        _ => ProviderError::unknown(message),
    }
}

fn extract_text(body: &Value) -> Result<String, ProviderError> {
    let parts = body
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array);

    let Some(parts) = parts else {
        let reason = body
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        return Err(ProviderError::unknown(format!("Gemini returned no content ({reason})")));
    };

    let text: String =
        parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)).collect();
    if text.trim().is_empty() {
        return Err(ProviderError::unknown("Gemini returned an empty response"));
    }
    Ok(text)
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}
