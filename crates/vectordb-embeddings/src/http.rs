//! Embedder backed by an OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::EmbeddingError;
use crate::model::{Embedder, Embedding, ModelInfo};

/// Configuration for the HTTP embedder.
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "text-embedding-3-small")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Expected embedding dimension
    pub dimension: usize,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum attempts per request
    pub max_retries: u32,
}

impl HttpEmbedderConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            dimension,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// HTTP embedder implementation.
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
    info: ModelInfo,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.dimension == 0 {
            return Err(EmbeddingError::Config("dimension must be > 0".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;

        let info = ModelInfo {
            name: config.model.clone(),
            dimension: config.dimension,
        };

        Ok(Self {
            client,
            config,
            info,
        })
    }

    /// Call the API with retry logic.
    async fn call_api(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, count = texts.len(), "Calling embedding API");

            match self.make_request(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e @ (EmbeddingError::Api(_) | EmbeddingError::RateLimitExceeded)) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %e, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Embedding call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make a single API request.
    async fn make_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts.to_vec(),
        };

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;

        if response.status() == 429 {
            return Err(EmbeddingError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("HTTP {}: {}", status, body)));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|d| d.index);
        body.data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.config.dimension {
                    Err(EmbeddingError::DimensionMismatch {
                        expected: self.config.dimension,
                        actual: d.embedding.len(),
                    })
                } else {
                    Ok(d.embedding)
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let mut vectors = self.call_api(&[text]).await?;
        vectors
            .pop()
            .map(Embedding::new)
            .ok_or_else(|| EmbeddingError::Parse("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.call_api(texts).await?;
        Ok(vectors.into_iter().map(Embedding::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dimension: usize) -> HttpEmbedderConfig {
        HttpEmbedderConfig::openai("test-key", "test-model", dimension)
            .with_base_url(server.uri())
            .with_max_retries(1)
    }

    #[test]
    fn test_openai_config() {
        let config = HttpEmbedderConfig::openai("key", "text-embedding-3-small", 1536);
        assert!(config.base_url.contains("openai"));
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, 1536);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let config = HttpEmbedderConfig::openai("key", "m", 0);
        assert!(matches!(
            HttpEmbedder::new(config),
            Err(EmbeddingError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [3.0, 4.0], "index": 0 }]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(config_for(&server, 2)).unwrap();
        let emb = embedder.embed("hello").await.unwrap();
        assert!((emb.values[0] - 0.6).abs() < 0.001);
        assert!((emb.values[1] - 0.8).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_batch_reordered_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "embedding": [0.0, 1.0], "index": 1 },
                    { "embedding": [1.0, 0.0], "index": 0 }
                ]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(config_for(&server, 2)).unwrap();
        let out = embedder.embed_batch(&["a", "b"]).await.unwrap();
        assert_eq!(out[0].values, vec![1.0, 0.0]);
        assert_eq!(out[1].values, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [1.0, 0.0, 0.0], "index": 0 }]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(config_for(&server, 2)).unwrap();
        let result = embedder.embed("hello").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(config_for(&server, 2)).unwrap();
        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbeddingError::RateLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(config_for(&server, 2)).unwrap();
        match embedder.embed("hello").await {
            Err(EmbeddingError::Api(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_request() {
        let server = MockServer::start().await;
        let embedder = HttpEmbedder::new(config_for(&server, 2)).unwrap();
        assert!(matches!(
            embedder.embed("   ").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
