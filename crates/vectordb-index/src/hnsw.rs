//! HNSW index implementation using usearch.
//!
//! Default parameters favor quality over speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)
//!
//! The index lives purely in memory. Persistence goes through
//! [`VectorIndex::export`]/[`VectorIndex::import`] so the bytes can be bundled
//! into a collection snapshot.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::index::{IndexStats, SearchResult, VectorIndex};

/// Distance metric used by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine distance (1 - cosine similarity)
    #[default]
    Cos,
    /// Squared euclidean distance
    L2sq,
    /// Inner product distance (1 - dot product)
    Ip,
}

impl Metric {
    fn kind(self) -> MetricKind {
        match self {
            Metric::Cos => MetricKind::Cos,
            Metric::L2sq => MetricKind::L2sq,
            Metric::Ip => MetricKind::IP,
        }
    }
}

/// HNSW index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Embedding dimension (must match the embedder)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,
    /// Initial reservation; the index grows past it when needed
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Distance metric
    #[serde(default)]
    pub metric: Metric,
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    200
}

fn default_expansion_search() -> usize {
    100
}

fn default_capacity() -> usize {
    1024
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            capacity: default_capacity(),
            metric: Metric::default(),
        }
    }
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: self.metric.kind(),
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // Single vector per label
        }
    }
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: Index,
    config: HnswConfig,
}

impl HnswIndex {
    /// Create an empty index.
    pub fn new(config: HnswConfig) -> Result<Self, VectorError> {
        if config.dimension == 0 {
            return Err(VectorError::Config("dimension must be > 0".to_string()));
        }
        let index = Self::fresh(&config)?;
        debug!(dim = config.dimension, metric = ?config.metric, "Created vector index");
        Ok(Self { index, config })
    }

    fn fresh(config: &HnswConfig) -> Result<Index, VectorError> {
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(config.capacity.max(1))
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(index)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Grow the reservation so one more vector fits.
    fn ensure_room(&self) -> Result<(), VectorError> {
        let capacity = self.index.capacity();
        if self.index.size() + 1 > capacity {
            let grown = (capacity * 2).max(self.config.capacity).max(16);
            self.index
                .reserve(grown)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            debug!(from = capacity, to = grown, "Grew vector index reservation");
        }
        Ok(())
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn upsert(&mut self, label: u64, vector: &[f32]) -> Result<(), VectorError> {
        self.check_dimension(vector)?;

        if self.index.contains(label) {
            self.index
                .remove(label)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }
        self.ensure_room()?;
        self.index
            .add(label, vector)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(label, "Upserted vector");
        Ok(())
    }

    fn remove(&mut self, label: u64) -> Result<bool, VectorError> {
        let removed = self
            .index
            .remove(label)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        if removed > 0 {
            debug!(label, "Removed vector");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn contains(&self, label: u64) -> bool {
        self.index.contains(label)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError> {
        self.check_dimension(query)?;
        if k == 0 || self.index.size() == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        let results: Vec<SearchResult> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&label, &distance)| SearchResult::new(label, distance))
            .collect();

        debug!(k, found = results.len(), "Search complete");
        Ok(results)
    }

    fn export(&self) -> Result<Vec<u8>, VectorError> {
        let mut buffer = vec![0u8; self.index.serialized_length()];
        self.index
            .save_to_buffer(&mut buffer)
            .map_err(|e| VectorError::Index(format!("Failed to export: {}", e)))?;
        debug!(bytes = buffer.len(), vectors = self.index.size(), "Exported vector index");
        Ok(buffer)
    }

    fn import(&mut self, bytes: &[u8]) -> Result<(), VectorError> {
        let index = Index::new(&self.config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .load_from_buffer(bytes)
            .map_err(|e| VectorError::Index(format!("Failed to import: {}", e)))?;

        if index.dimensions() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: index.dimensions(),
            });
        }

        let reserve = index.size().max(self.config.capacity).max(1);
        index
            .reserve(reserve)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        info!(vectors = index.size(), "Imported vector index");
        self.index = index;
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.index.size(),
            dimension: self.config.dimension,
            capacity: self.index.capacity(),
            serialized_bytes: self.index.serialized_length(),
        }
    }

    fn clear(&mut self) -> Result<(), VectorError> {
        self.index = Self::fresh(&self.config)?;
        info!("Cleared vector index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_vector(dim: usize) -> Vec<f32> {
        use rand::Rng;
        let mut rng = rand::rng();
        (0..dim).map(|_| rng.random::<f32>() + 0.01).collect()
    }

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_create_index() {
        let index = HnswIndex::new(HnswConfig::new(384)).unwrap();
        assert_eq!(index.dimension(), 384);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            HnswIndex::new(HnswConfig::new(0)),
            Err(VectorError::Config(_))
        ));
    }

    #[test]
    fn test_add_and_search() {
        let mut index = HnswIndex::new(HnswConfig::new(64).with_capacity(100)).unwrap();

        for i in 0..10 {
            index.upsert(i, &random_vector(64)).unwrap();
        }
        assert_eq!(index.len(), 10);

        let results = index.search(&random_vector(64), 5).unwrap();
        assert_eq!(results.len(), 5);

        // Ascending distance
        for i in 1..results.len() {
            assert!(results[i - 1].distance <= results[i].distance);
        }
    }

    #[test]
    fn test_nearest_is_exact_match() {
        let mut index = HnswIndex::new(HnswConfig::new(8)).unwrap();
        for i in 0..4 {
            index.upsert(i as u64, &axis(8, i)).unwrap();
        }
        let results = index.search(&axis(8, 2), 1).unwrap();
        assert_eq!(results[0].label, 2);
        assert!(results[0].distance.abs() < 1e-4);
    }

    #[test]
    fn test_upsert_overwrites_label() {
        let mut index = HnswIndex::new(HnswConfig::new(8)).unwrap();
        index.upsert(7, &axis(8, 0)).unwrap();
        index.upsert(7, &axis(8, 5)).unwrap();
        assert_eq!(index.len(), 1);

        let results = index.search(&axis(8, 5), 1).unwrap();
        assert_eq!(results[0].label, 7);
        assert!(results[0].distance.abs() < 1e-4);
    }

    #[test]
    fn test_grows_past_reservation() {
        let mut index = HnswIndex::new(HnswConfig::new(16).with_capacity(2)).unwrap();
        for i in 0..50 {
            index.upsert(i, &random_vector(16)).unwrap();
        }
        assert_eq!(index.len(), 50);
    }

    #[test]
    fn test_export_and_import() {
        let config = HnswConfig::new(32).with_capacity(100);
        let mut index = HnswIndex::new(config.clone()).unwrap();
        for i in 0..5 {
            index.upsert(i, &random_vector(32)).unwrap();
        }
        let bytes = index.export().unwrap();

        let mut restored = HnswIndex::new(config).unwrap();
        restored.import(&bytes).unwrap();
        assert_eq!(restored.len(), 5);
        for i in 0..5 {
            assert!(restored.contains(i));
        }

        // Still writable after import
        restored.upsert(99, &random_vector(32)).unwrap();
        assert_eq!(restored.len(), 6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = HnswIndex::new(HnswConfig::new(64)).unwrap();
        let result = index.upsert(0, &random_vector(32));
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
        let result = index.search(&random_vector(32), 1);
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_remove() {
        let mut index = HnswIndex::new(HnswConfig::new(64).with_capacity(100)).unwrap();

        index.upsert(42, &random_vector(64)).unwrap();
        assert!(index.contains(42));

        assert!(index.remove(42).unwrap());
        assert!(!index.contains(42));
        assert!(!index.remove(42).unwrap());
    }

    #[test]
    fn test_search_empty() {
        let index = HnswIndex::new(HnswConfig::new(8)).unwrap();
        assert!(index.search(&axis(8, 0), 10).unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut index = HnswIndex::new(HnswConfig::new(8)).unwrap();
        index.upsert(1, &axis(8, 1)).unwrap();
        index.clear().unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = HnswConfig::new(128).with_metric(Metric::L2sq);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("l2sq"));
        let decoded: HnswConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.dimension, 128);
        assert_eq!(decoded.metric, Metric::L2sq);
    }
}
