//! Embedder trait and embedding types.
//!
//! Defines the interface a collection uses to turn text into vectors.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Vector embedding - a float array, normalized unless built raw.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Borrow the raw values.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Consume into the raw values.
    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let na: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::from_normalized(values)
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "text-embedding-3-small")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
}

/// Trait for embedding services.
///
/// Calls are asynchronous and may fail. Dropping the returned future aborts
/// the request in flight, which is how collections implement cancellation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts.
    /// Default implementation calls embed() for each text.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
