//! CLI argument parsing for the vectordb admin tool.
//!
//! CLI flags override all other config sources.

use clap::{Args, Parser, Subcommand};

/// vectordb admin tool
///
/// Inspect and edit the collections stored in a vectordb data directory.
#[derive(Parser, Debug)]
#[command(name = "vectordb")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/vectordb/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override data directory
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Query source for search and put commands
#[derive(Args, Debug, Clone, PartialEq)]
#[group(required = true, multiple = false)]
pub struct VectorSource {
    /// Comma-separated vector components
    #[arg(long)]
    pub vector: Option<String>,

    /// Text to embed with the configured embedder
    #[arg(long)]
    pub text: Option<String>,
}

/// Admin commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List persisted collections with their sizes
    Collections,

    /// Show statistics for one collection
    Stats {
        /// Collection name
        collection: String,
    },

    /// List live items
    List {
        /// Collection name
        collection: String,

        /// Maximum results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show one item
    Get {
        /// Collection name
        collection: String,

        /// Slot id
        id: u32,
    },

    /// Insert an item, creating the collection if needed
    Put {
        /// Collection name
        collection: String,

        /// JSON payload; a bare string is stored as a JSON string
        #[arg(short, long)]
        payload: Option<String>,

        #[command(flatten)]
        source: VectorSource,
    },

    /// Delete one item
    DeleteItem {
        /// Collection name
        collection: String,

        /// Slot id
        id: u32,
    },

    /// Nearest-neighbor search across one or more collections
    Search {
        /// Collection names
        #[arg(required = true)]
        collections: Vec<String>,

        #[command(flatten)]
        source: VectorSource,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Delete a collection and its files
    Drop {
        /// Collection name
        collection: String,
    },
}
