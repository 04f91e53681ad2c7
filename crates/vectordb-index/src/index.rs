//! Vector index trait and types.
//!
//! Defines the interface the index worker drives.

use crate::error::VectorError;

/// Result of a vector search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Label the vector was stored under
    pub label: u64,
    /// Distance to the query (lower = closer)
    pub distance: f32,
}

impl SearchResult {
    pub fn new(label: u64, distance: f32) -> Self {
        Self { label, distance }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Number of vectors in the index
    pub vector_count: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Reserved capacity
    pub capacity: usize,
    /// Size of a full export in bytes
    pub serialized_bytes: usize,
}

/// Trait for vector indexes.
///
/// An index is owned by exactly one worker thread, so methods take `&mut self`
/// for mutation and need not be `Sync`.
pub trait VectorIndex: Send {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a vector under `label`, replacing any vector already stored
    /// under it.
    fn upsert(&mut self, label: u64, vector: &[f32]) -> Result<(), VectorError>;

    /// Remove a vector by label. Returns whether anything was removed.
    fn remove(&mut self, label: u64) -> Result<bool, VectorError>;

    /// Check if a label exists
    fn contains(&self, label: u64) -> bool;

    /// Search for k nearest neighbors.
    /// Returns results sorted by ascending distance.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError>;

    /// Serialize the whole index.
    fn export(&self) -> Result<Vec<u8>, VectorError>;

    /// Replace the index contents with a previous export.
    fn import(&mut self, bytes: &[u8]) -> Result<(), VectorError>;

    /// Get index statistics
    fn stats(&self) -> IndexStats;

    /// Clear all vectors from the index
    fn clear(&mut self) -> Result<(), VectorError>;
}
