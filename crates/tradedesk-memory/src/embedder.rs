use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MemoryError;

const LOCAL_OLLAMA_URL: &str = "http://localhost:11434/v1";

/// Turns text into an embedding vector. Mockable for testing.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// Embedding model for an endpoint: the local Ollama endpoint serves
/// `nomic-embed-text`, everything else gets `text-embedding-3-small`.
pub fn default_embedding_model(base_url: &str) -> &'static str {
    if base_url.trim_end_matches('/') == LOCAL_OLLAMA_URL {
        "nomic-embed-text"
    } else {
        "text-embedding-3-small"
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        model: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, MemoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| default_embedding_model(base_url).to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::Embedding(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| MemoryError::Embedding("empty embedding response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_follows_endpoint() {
        assert_eq!(
            default_embedding_model("http://localhost:11434/v1"),
            "nomic-embed-text"
        );
        assert_eq!(
            default_embedding_model("http://localhost:11434/v1/"),
            "nomic-embed-text"
        );
        assert_eq!(
            default_embedding_model("https://api.openai.com/v1"),
            "text-embedding-3-small"
        );
    }

    #[test]
    fn explicit_model_wins() {
        let embedder = OpenAiEmbedder::new(
            "https://api.openai.com/v1",
            Some("text-embedding-3-large".into()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.model(), "text-embedding-3-large");
        assert_eq!(embedder.base_url, "https://api.openai.com/v1");
    }
}
