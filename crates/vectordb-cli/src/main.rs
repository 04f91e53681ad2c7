//! vectordb admin tool
//!
//! Inspect and edit the collections in a vectordb data directory.
//!
//! # Usage
//!
//! ```bash
//! vectordb collections
//! vectordb stats <COLLECTION>
//! vectordb list <COLLECTION> [-n LIMIT]
//! vectordb get <COLLECTION> <ID>
//! vectordb put <COLLECTION> [--payload JSON] (--vector CSV | --text TEXT)
//! vectordb delete-item <COLLECTION> <ID>
//! vectordb search <COLLECTION>... (--vector CSV | --text TEXT) [-n LIMIT]
//! vectordb drop <COLLECTION>
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/vectordb/config.toml)
//! 3. Environment variables (VECTORDB_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use vectordb_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    run(
        cli.config.as_deref(),
        cli.data_dir.as_deref(),
        cli.log_level.as_deref(),
        cli.command,
    )
    .await
}
