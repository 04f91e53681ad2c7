//! # vectordb-store
//!
//! Per-collection durable vector object store.
//!
//! Each named collection assigns stable integer slots to items, keeps each
//! item's payload in its own block file, indexes item vectors in an ANN
//! index and periodically writes a snapshot of the slot registry together
//! with the exported index so state survives restarts.
//!
//! ## Layout on disk
//!
//! ```text
//! <data_dir>/
//!   <collection>/
//!     index.bin      registry + exported index
//!     <id>.block     JSON payload of item <id>
//! ```
//!
//! ## Components
//! - [`SlotAllocator`]: O(1) free/reserved/used partition
//! - [`Registry`]: per-slot [`SlotFlags`], the persisted source of truth
//! - [`SlotLocks`]: self-pruning per-slot async mutexes
//! - [`BlockFs`]: file access, atomic writes in [`LocalFs`]
//! - [`SaveScheduler`]: debounced snapshot timer plus save queue
//! - [`Collection`]: the engine tying the above together
//! - [`VectorDbClient`]: name → collection registry

pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod fs;
pub mod locks;
pub mod registry;
pub mod scheduler;
pub mod slots;
pub mod snapshot;

/// Slot index inside one collection.
pub type SlotId = u32;

pub use client::{CollectionEvent, CollectionHit, VectorDbClient};
pub use collection::{
    Collection, CollectionStats, Item, ScoredItem, SearchOptions, DEFAULT_SEARCH_LIMIT,
};
pub use config::{EmbedderSettings, HnswSettings, Settings, StoreConfig};
pub use error::StoreError;
pub use fs::{BlockFs, LocalFs};
pub use locks::{SlotLease, SlotLocks};
pub use registry::{Registry, SlotFlags};
pub use scheduler::{SaveScheduler, SnapshotTarget};
pub use slots::{SlotAllocator, SlotState};
pub use snapshot::Snapshot;

// Re-export the collaborator types callers need to build a client
pub use tokio_util::sync::CancellationToken;
pub use vectordb_embeddings::{Embedder, HashEmbedder, HttpEmbedder, HttpEmbedderConfig};
pub use vectordb_index::Metric;
