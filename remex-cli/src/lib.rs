//! Remex CLI Library
//!
//! Core functionality of the `remex` binary: config file loading, node
//! discovery and one-shot command execution on a remote interpreter.

pub mod cli;
pub mod config;
pub mod discover;
pub mod run;

// Re-export main types for convenience
pub use cli::{Cli, Commands};
pub use config::{load_session_config, RemexConfig};
pub use discover::{nodes_to_json, DiscoverCommand};
pub use run::{select_node, RunCommand, RunRequest};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
