//! Command line definition of the `remex` binary

use clap::{Parser, Subcommand};
use remex_node::ExecMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "remex")]
#[command(about = "Discover remote interpreters on the local network and run commands on them")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the remote nodes answering on the multicast group
    #[command(name = "discover")]
    Discover {
        /// How long to listen for pongs
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },
    /// Run one command on a remote node and print its result
    #[command(name = "run")]
    Run {
        /// Target node id (default: first discovered node)
        #[arg(short, long)]
        node: Option<String>,

        /// exec_file, exec_statement or eval_statement
        #[arg(short, long, default_value_t = ExecMode::ExecFile)]
        mode: ExecMode,

        /// Let the remote interpreter block on user interaction
        #[arg(long)]
        interactive: bool,

        /// Exit with an error when the result is not a success
        #[arg(long)]
        raise_on_failure: bool,

        /// How long to wait for a remote node to show up
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,

        /// Command text, passed to the remote interpreter untouched
        command: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["remex", "run", "print(1)"]).unwrap();
        assert!(!cli.verbose);
        match cli.command {
            Commands::Run {
                node,
                mode,
                interactive,
                raise_on_failure,
                wait_ms,
                command,
            } => {
                assert_eq!(node, None);
                assert_eq!(mode, ExecMode::ExecFile);
                assert!(!interactive);
                assert!(!raise_on_failure);
                assert_eq!(wait_ms, 2000);
                assert_eq!(command, "print(1)");
            }
            _ => panic!("expected run"),
        }
    }
}
