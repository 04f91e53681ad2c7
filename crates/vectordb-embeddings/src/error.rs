//! Embedding error types.

use thiserror::Error;

/// Errors that can occur while producing embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Request to the embedding endpoint failed
    #[error("API request failed: {0}")]
    Api(String),

    /// Endpoint returned something we could not parse
    #[error("Failed to parse embedding response: {0}")]
    Parse(String),

    /// Endpoint is throttling us
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Invalid embedder configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
