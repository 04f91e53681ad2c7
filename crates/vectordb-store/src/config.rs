//! Configuration loading for vectordb.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/vectordb/config.toml.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use vectordb_index::{HnswConfig, Metric};

use crate::error::StoreError;

/// HNSW tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswSettings {
    /// Graph degree (M)
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// Candidate list size during insertion (ef_construction)
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// Candidate list size during search (ef_search)
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

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

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            metric: Metric::default(),
        }
    }
}

/// Remote embedding endpoint (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    #[serde(default = "default_embedder_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedder_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedder_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_embedder_retries")]
    pub max_retries: u32,
}

fn default_embedder_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedder_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedder_timeout() -> u64 {
    30
}

fn default_embedder_retries() -> u32 {
    3
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            base_url: default_embedder_base_url(),
            model: default_embedder_model(),
            api_key: None,
            timeout_secs: default_embedder_timeout(),
            max_retries: default_embedder_retries(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding one subdirectory per collection
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Slots per collection
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Embedding dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Snapshot debounce interval
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,

    #[serde(default)]
    pub hnsw: HnswSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Remote embedder; absent means the offline hash embedder is used
    #[serde(default)]
    pub embedder: Option<EmbedderSettings>,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "vectordb")
        .map(|p| p.data_local_dir().join("collections"))
        .unwrap_or_else(|| PathBuf::from("./vectordb-data"))
        .to_string_lossy()
        .to_string()
}

fn default_capacity() -> usize {
    10_000
}

fn default_dimension() -> usize {
    384
}

fn default_save_interval_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            capacity: default_capacity(),
            dimension: default_dimension(),
            save_interval_ms: default_save_interval_ms(),
            hnsw: HnswSettings::default(),
            log_level: default_log_level(),
            embedder: None,
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/vectordb/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (VECTORDB_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, StoreError> {
        let config_dir = ProjectDirs::from("", "", "vectordb")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())
            .map_err(|e| StoreError::Config(e.to_string()))?
            .set_default("capacity", default_capacity() as i64)
            .map_err(|e| StoreError::Config(e.to_string()))?
            .set_default("dimension", default_dimension() as i64)
            .map_err(|e| StoreError::Config(e.to_string()))?
            .set_default("save_interval_ms", default_save_interval_ms() as i64)
            .map_err(|e| StoreError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| StoreError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: VECTORDB_DATA_DIR, VECTORDB_SAVE_INTERVAL_MS, VECTORDB_HNSW__METRIC
        builder = builder.add_source(
            Environment::with_prefix("VECTORDB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make a collection unusable.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.capacity == 0 {
            return Err(StoreError::Config("capacity must be > 0".to_string()));
        }
        if self.capacity > u32::MAX as usize {
            return Err(StoreError::Config(format!(
                "capacity must fit in 32 bits, got {}",
                self.capacity
            )));
        }
        if self.dimension == 0 {
            return Err(StoreError::Config("dimension must be > 0".to_string()));
        }
        if self.save_interval_ms == 0 {
            return Err(StoreError::Config("save_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Expand ~ in data_dir to the home directory
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(home) = BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }

    /// Store configuration derived from these settings.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.expanded_data_dir(), self.dimension)
            .with_capacity(self.capacity)
            .with_save_interval(Duration::from_millis(self.save_interval_ms))
            .with_hnsw(self.hnsw.clone())
    }
}

/// Runtime configuration shared by every collection under one root.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub capacity: usize,
    pub dimension: usize,
    pub save_interval: Duration,
    pub hnsw: HnswSettings,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            root: root.into(),
            capacity: default_capacity(),
            dimension,
            save_interval: Duration::from_millis(default_save_interval_ms()),
            hnsw: HnswSettings::default(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_hnsw(mut self, hnsw: HnswSettings) -> Self {
        self.hnsw = hnsw;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.hnsw.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.capacity == 0 || self.capacity > u32::MAX as usize {
            return Err(StoreError::Config(format!(
                "capacity must be in 1..=2^32-1, got {}",
                self.capacity
            )));
        }
        if self.dimension == 0 {
            return Err(StoreError::Config("dimension must be > 0".to_string()));
        }
        if self.save_interval.is_zero() {
            return Err(StoreError::Config("save interval must be > 0".to_string()));
        }
        Ok(())
    }

    /// Directory for one collection.
    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// HNSW parameters for a fresh index sized to one collection.
    pub fn hnsw_config(&self) -> HnswConfig {
        HnswConfig::new(self.dimension)
            .with_connectivity(self.hnsw.connectivity)
            .with_expansion(self.hnsw.expansion_add, self.hnsw.expansion_search)
            .with_capacity(self.capacity)
            .with_metric(self.hnsw.metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.capacity, 10_000);
        assert_eq!(settings.dimension, 384);
        assert_eq!(settings.save_interval_ms, 5000);
        assert_eq!(settings.hnsw.connectivity, 16);
        assert!(settings.embedder.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert!(settings.capacity > 0);
        assert!(settings.dimension > 0);
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut settings = Settings::default();
        settings.capacity = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.dimension = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.save_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expanded_data_dir() {
        let settings = Settings {
            data_dir: "/var/lib/vectordb".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_data_dir(), PathBuf::from("/var/lib/vectordb"));

        let settings = Settings {
            data_dir: "~/vectors".to_string(),
            ..Default::default()
        };
        assert!(settings.expanded_data_dir().ends_with("vectors"));
        assert!(!settings.expanded_data_dir().starts_with("~"));
    }

    #[test]
    fn test_store_config_from_settings() {
        let settings = Settings {
            data_dir: "/tmp/vdb".to_string(),
            capacity: 64,
            dimension: 8,
            save_interval_ms: 250,
            ..Default::default()
        };
        let config = settings.store_config();
        assert_eq!(config.collection_dir("notes"), PathBuf::from("/tmp/vdb/notes"));
        assert_eq!(config.save_interval, Duration::from_millis(250));

        let hnsw = config.hnsw_config();
        assert_eq!(hnsw.dimension, 8);
        assert_eq!(hnsw.capacity, 64);
    }

    #[test]
    fn test_embedder_settings_deserialize() {
        let json = r#"{"model": "nomic-embed-text", "base_url": "http://localhost:11434/v1"}"#;
        let embedder: EmbedderSettings = serde_json::from_str(json).unwrap();
        assert_eq!(embedder.model, "nomic-embed-text");
        assert_eq!(embedder.timeout_secs, 30);
        assert!(embedder.api_key.is_none());
    }
}
