//! End-to-end test infrastructure for vectordb.
//!
//! Provides a shared TestHarness and helper functions for E2E tests that
//! drive the client, collections and on-disk snapshots together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vectordb_embeddings::HashEmbedder;
use vectordb_store::{Collection, StoreConfig, VectorDbClient};

/// Dimension used by harness collections.
pub const TEST_DIMENSION: usize = 16;

/// Shared test harness for E2E tests.
///
/// Owns a temp data directory and builds clients over it. Clients made from
/// the same harness see the same files, which is how restart scenarios are
/// simulated.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Root data directory
    pub data_dir: PathBuf,
    /// Slots per collection
    pub capacity: usize,
    /// Snapshot debounce interval
    pub save_interval: Duration,
}

impl TestHarness {
    /// Harness with capacity 1000 and a save interval long enough that only
    /// explicit saves hit disk.
    pub fn new() -> Self {
        Self::with_settings(1000, Duration::from_secs(3600))
    }

    pub fn with_settings(capacity: usize, save_interval: Duration) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        Self {
            _temp_dir: temp_dir,
            data_dir,
            capacity,
            save_interval,
        }
    }

    pub fn config(&self) -> StoreConfig {
        StoreConfig::new(&self.data_dir, TEST_DIMENSION)
            .with_capacity(self.capacity)
            .with_save_interval(self.save_interval)
    }

    /// Fresh client over the harness directory. Nothing is loaded yet.
    pub fn client(&self) -> VectorDbClient {
        VectorDbClient::local(self.config(), Arc::new(HashEmbedder::new(TEST_DIMENSION)))
    }

    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Unit vector along axis `i` (wrapping).
pub fn axis_vector(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; TEST_DIMENSION];
    v[i % TEST_DIMENSION] = 1.0;
    v
}

/// `count` random non-zero vectors from a seeded generator.
pub fn random_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut v: Vec<f32> = (0..TEST_DIMENSION)
                .map(|_| rng.random_range(-1.0..1.0))
                .collect();
            v[0] += 2.0;
            v
        })
        .collect()
}

/// Insert `count` items with payload `{"n": i}`, returning their ids in
/// insertion order.
pub async fn insert_numbered(collection: &Collection, count: usize, seed: u64) -> Vec<u32> {
    let mut ids = Vec::with_capacity(count);
    for (i, vector) in random_vectors(count, seed).into_iter().enumerate() {
        let item = collection
            .insert_with_vector(Some(serde_json::json!({ "n": i })), &vector)
            .await
            .expect("Failed to insert item");
        ids.push(item.id);
    }
    ids
}

/// Number of `.block` files in a collection directory.
pub fn count_block_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "block"))
                .count()
        })
        .unwrap_or(0)
}
