//! Deterministic feature-hashing embedder.
//!
//! Lowercased alphanumeric tokens are hashed (FNV-1a) into a fixed number of
//! buckets with a sign bit, then normalized. Texts that share words land close
//! together, which is enough for offline use and tests.

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::model::{Embedder, Embedding, ModelInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Offline embedder based on the hashing trick.
pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "feature-hash".to_string(),
                dimension,
            },
        }
    }

    /// Synchronous embedding, shared by the trait impl.
    pub fn embed_sync(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let dim = self.info.dimension;
        if dim == 0 {
            return Err(EmbeddingError::Config("dimension must be > 0".to_string()));
        }

        let mut values = vec![0.0f32; dim];
        let mut tokens = 0usize;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % dim as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(EmbeddingError::InvalidInput(
                "text has no embeddable tokens".to_string(),
            ));
        }

        Ok(Embedding::new(values))
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_sync(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_sync("hello world").unwrap();
        let b = embedder.embed_sync("Hello, World!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimension(), 64);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashEmbedder::new(256);
        let base = embedder.embed_sync("rust ownership borrow checker").unwrap();
        let near = embedder.embed_sync("rust borrow checker rules").unwrap();
        let far = embedder.embed_sync("pasta carbonara recipe").unwrap();
        assert!(base.cosine_similarity(&near) > base.cosine_similarity(&far));
    }

    #[test]
    fn test_empty_text_rejected() {
        let embedder = HashEmbedder::new(16);
        assert!(matches!(
            embedder.embed_sync("  ... "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_trait_embed() {
        let embedder = HashEmbedder::new(32);
        let emb = embedder.embed("some text").await.unwrap();
        assert_eq!(emb.dimension(), 32);
        assert_eq!(embedder.info().dimension, 32);
    }
}
