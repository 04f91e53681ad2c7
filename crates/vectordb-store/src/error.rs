//! Store error types.

use thiserror::Error;

use vectordb_embeddings::EmbeddingError;
use vectordb_index::VectorError;

use crate::SlotId;

/// Errors returned by collections and the collection registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Item or collection does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller passed something unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Collection name already registered
    #[error("Collection already exists: {0}")]
    Duplicate(String),

    /// No free slot left
    #[error("Collection capacity exhausted ({capacity} slots)")]
    CapacityExhausted { capacity: usize },

    /// Search or embedding aborted through a cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Persisted snapshot could not be decoded
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Registry says a block exists but the file is gone
    #[error("Block file missing for live slot {0}")]
    MissingBlock(SlotId),

    /// Collection was destroyed and no longer accepts work
    #[error("Collection closed: {0}")]
    Closed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ANN index worker error
    #[error("Index error: {0}")]
    Index(#[from] VectorError),

    /// Embedding service error
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Payload encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True when the operation was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
