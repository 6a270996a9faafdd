pub mod embed;
pub mod error;
pub mod retry;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sitcom_config::{LlmConfig, ProviderKind, SamplingPreset};
use tracing::debug;

pub use embed::{Embedder, HashEmbedder, OllamaEmbedder, OpenAiEmbedder, build_embedder};
pub use error::{LlmError, LlmResult};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use scripted::ScriptedLlm;

/// Sampling parameters sent with a single completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

impl Sampling {
    pub const fn new(temperature: f32, top_p: f32) -> Self {
        Self { temperature, top_p }
    }
}

impl From<SamplingPreset> for Sampling {
    fn from(preset: SamplingPreset) -> Self {
        Self::new(preset.temperature, preset.top_p)
    }
}

/// A text-completion backend.
///
/// Implementations return [`LlmError::EmptyResponse`] when the provider
/// answers with no content so that callers can retry it like any other
/// transient failure.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, sampling: Sampling) -> LlmResult<String>;

    /// Short provider label used in logs and error messages.
    fn provider(&self) -> &str;
}

fn non_empty(provider: &str, content: Option<&str>) -> LlmResult<String> {
    match content.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::EmptyResponse {
            provider: provider.to_string(),
        }),
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|err| LlmError::Configuration(format!("could not build HTTP client: {err}")))
}

pub(crate) async fn read_json(
    provider: &str,
    response: reqwest::Response,
) -> LlmResult<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response.json().await.map_err(|err| LlmError::Decode {
        provider: provider.to_string(),
        reason: err.to_string(),
    })
}

// ── OpenAI-compatible chat completions ────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        if config.openai_api_key.trim().is_empty() {
            return Err(LlmError::Configuration(
                "OPENAI_API_KEY is not set; export it or switch provider to ollama".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str, sampling: Sampling) -> LlmResult<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "openai completion");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                provider: self.provider().to_string(),
                source,
            })?;

        let body = read_json(self.provider(), response).await?;
        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str());
        non_empty(self.provider(), content)
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

// ── Ollama ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str, sampling: Sampling) -> LlmResult<String> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": sampling.temperature,
                "top_p": sampling.top_p,
            }
        });

        debug!(model = %self.model, prompt_len = prompt.len(), "ollama completion");
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                provider: self.provider().to_string(),
                source,
            })?;

        let body = read_json(self.provider(), response).await?;
        non_empty(
            self.provider(),
            body.get("response").and_then(|value| value.as_str()),
        )
    }

    fn provider(&self) -> &str {
        "ollama"
    }
}

/// Build the completion client selected by `[llm] provider`.
pub fn build_client(config: &LlmConfig) -> LlmResult<Arc<dyn LlmClient>> {
    match config.provider {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiClient::new(config)?)),
        ProviderKind::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_rejects_blank_content() {
        assert!(matches!(
            non_empty("openai", Some("   \n")),
            Err(LlmError::EmptyResponse { .. })
        ));
        assert!(matches!(
            non_empty("openai", None),
            Err(LlmError::EmptyResponse { .. })
        ));
        assert_eq!(non_empty("openai", Some(" Yes\n")).unwrap(), "Yes");
    }

    #[test]
    fn openai_client_requires_api_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiClient::new(&config),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn build_client_selects_provider() {
        let mut config = LlmConfig::default();
        config.provider = ProviderKind::Ollama;
        let client = build_client(&config).unwrap();
        assert_eq!(client.provider(), "ollama");

        config.provider = ProviderKind::OpenAi;
        config.openai_api_key = "sk-test".to_string();
        let client = build_client(&config).unwrap();
        assert_eq!(client.provider(), "openai");
    }

    #[test]
    fn sampling_from_preset() {
        let sampling = Sampling::from(SamplingPreset::new(0.7, 0.9));
        assert_eq!(sampling, Sampling::new(0.7, 0.9));
    }
}
