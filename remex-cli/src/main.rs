//! Remex CLI - discover remote interpreters and run commands on them

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use remex_cli::cli::{Cli, Commands};
use remex_cli::{load_session_config, nodes_to_json, DiscoverCommand, RunCommand, RunRequest};
use remex_common::logging::{Component, Logger};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    remex_common::init_env_logger(level);

    let logger = Arc::new(Logger::new_root(Component::CLI, "main"));
    let config = load_session_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Discover { wait_ms } => {
            let nodes = DiscoverCommand::new(config, logger)
                .run(Duration::from_millis(wait_ms))
                .await?;
            println!("{}", serde_json::to_string_pretty(&nodes_to_json(&nodes))?);
        }
        Commands::Run {
            node,
            mode,
            interactive,
            raise_on_failure,
            wait_ms,
            command,
        } => {
            let request = RunRequest {
                command,
                node_id: node,
                exec_mode: mode,
                interactive,
                raise_on_failure,
                wait: Duration::from_millis(wait_ms),
            };
            let data = RunCommand::new(config, logger).run(&request).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
    }

    Ok(())
}
