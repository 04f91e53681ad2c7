//! # vectordb-embeddings
//!
//! Embedding collaborators for vectordb collections.
//!
//! A collection never computes vectors itself. It asks an [`Embedder`] for
//! one whenever an item is written or searched by text.
//!
//! ## Features
//! - `HttpEmbedder`: OpenAI-compatible `/embeddings` endpoint with retry
//! - `HashEmbedder`: deterministic feature-hashing embedder for offline use
//! - Normalized [`Embedding`] vectors with cosine helpers

pub mod error;
pub mod hash;
pub mod http;
pub mod model;

pub use error::EmbeddingError;
pub use hash::HashEmbedder;
pub use http::{HttpEmbedder, HttpEmbedderConfig};
pub use model::{Embedder, Embedding, ModelInfo};
