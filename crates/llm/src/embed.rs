//! Text embedding backends used to populate scene memory.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use sitcom_config::{AppConfig, EmbeddingBackend};
use tracing::info;

use crate::error::{LlmError, LlmResult};
use crate::{http_client, read_json};

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, text: &str) -> LlmResult<Vec<f32>>;

    /// Length of the vectors this backend is expected to produce.
    fn dimension(&self) -> usize;
}

fn float_array(provider: &str, value: Option<&serde_json::Value>) -> LlmResult<Vec<f32>> {
    let embedding = value
        .and_then(|value| value.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Vec<f32>>()
        })
        .unwrap_or_default();
    if embedding.is_empty() {
        return Err(LlmError::EmptyResponse {
            provider: provider.to_string(),
        });
    }
    Ok(embedding)
}

// ── Hashing ───────────────────────────────────────────────────────────────────

/// Deterministic bag-of-words embedding via signed feature hashing.
///
/// Each lowercase alphanumeric token is hashed with SHA-256; the first eight
/// bytes pick a bucket and the ninth picks the sign.  The result is
/// L2-normalised, so texts sharing vocabulary score a high cosine similarity.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn encode(&self, text: &str) -> LlmResult<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ── Ollama ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize, timeout_secs: u64) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn encode(&self, text: &str) -> LlmResult<Vec<f32>> {
        let body = json!({ "model": self.model, "prompt": text });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                provider: "ollama".to_string(),
                source,
            })?;
        let json = read_json("ollama", response).await?;
        float_array("ollama", json.get("embedding"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ── OpenAI ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        dimension: usize,
        timeout_secs: u64,
    ) -> LlmResult<Self> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Configuration(
                "OPENAI_API_KEY is required for the openai embedding backend".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn encode(&self, text: &str) -> LlmResult<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| LlmError::Network {
                provider: "openai".to_string(),
                source,
            })?;
        let json = read_json("openai", response).await?;
        let first = json
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|item| item.get("embedding"));
        float_array("openai", first)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedder selected by `[memory] embedding_backend`.
pub fn build_embedder(config: &AppConfig) -> LlmResult<Arc<dyn Embedder>> {
    let memory = &config.memory;
    let embedder: Arc<dyn Embedder> = match memory.embedding_backend {
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(memory.embedding_dimension)),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(
            &config.llm.ollama_base_url,
            &memory.embedding_model,
            memory.embedding_dimension,
            config.llm.request_timeout_secs,
        )?),
        EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbedder::new(
            &config.llm.openai_base_url,
            &config.llm.openai_api_key,
            &memory.embedding_model,
            memory.embedding_dimension,
            config.llm.request_timeout_secs,
        )?),
    };
    info!(
        backend = ?memory.embedding_backend,
        dimension = memory.embedding_dimension,
        "embedding backend configured"
    );
    Ok(embedder)
}
