//! # vectordb-index
//!
//! Approximate nearest neighbor index for vectordb collections.
//!
//! Each collection talks to its index through an [`AnnWorker`]: a handle to a
//! dedicated thread that owns a [`VectorIndex`] and answers requests in FIFO
//! order. The default index is HNSW via usearch.
//!
//! ## Features
//! - Labels are slot ids; adding an existing label overwrites its vector
//! - Whole-index export/import as bytes, for embedding in a snapshot
//! - Configurable HNSW parameters (M, ef_construction, ef_search) and metric

pub mod error;
pub mod hnsw;
pub mod index;
pub mod worker;

pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex, Metric};
pub use index::{IndexStats, SearchResult, VectorIndex};
pub use worker::AnnWorker;
