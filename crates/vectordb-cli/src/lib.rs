//! vectordb admin tool library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, VectorSource};
pub use commands::{
    build_embedder, execute, init_logging, load_settings, open_client, parse_payload,
    parse_vector, run,
};
