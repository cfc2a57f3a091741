//! Run command for the Remex CLI
//!
//! Finds a remote interpreter, opens a command connection to it and runs a
//! single command. The session is one-shot and is stopped afterwards.

use anyhow::{anyhow, Context, Result};
use remex_common::logging::Logger;
use remex_node::{ExecMode, Payload, RemoteNode, RunOptions, Session, SessionConfig};
use std::sync::Arc;
use std::time::Duration;

/// What to run and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub command: String,
    /// Target node; the first discovered node when absent
    pub node_id: Option<String>,
    pub exec_mode: ExecMode,
    pub interactive: bool,
    pub raise_on_failure: bool,
    pub wait: Duration,
}

impl RunRequest {
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(self.exec_mode)
            .with_unattended(!self.interactive)
            .with_raise_on_failure(self.raise_on_failure)
    }
}

pub struct RunCommand {
    config: SessionConfig,
    logger: Arc<Logger>,
}

impl RunCommand {
    pub fn new(config: SessionConfig, logger: Arc<Logger>) -> Self {
        Self { config, logger }
    }

    pub async fn run(&self, request: &RunRequest) -> Result<Payload> {
        let mut session = Session::new(self.config.clone());
        session
            .start()
            .await
            .context("Failed to start discovery")?;

        let result = self.run_in_session(&mut session, request).await;
        // run_command stops the session itself; this covers the earlier exits
        session.stop().await;
        result
    }

    async fn run_in_session(&self, session: &mut Session, request: &RunRequest) -> Result<Payload> {
        let nodes = session.wait_for_remote_nodes(request.wait).await;
        let target = select_node(&nodes, request.node_id.as_deref())?;
        if !nodes.iter().any(|n| n.id == target) {
            self.logger
                .warn(format!("Node {target} has not been discovered yet"));
        }
        self.logger.info(format!("Connecting to {target}"));

        session
            .open_command_connection(&target)
            .await
            .with_context(|| format!("Failed to open a command connection to {target}"))?;

        let data = session
            .run_command(&request.command, request.run_options())
            .await?;
        Ok(data)
    }
}

/// Pick the requested node, or the first one when none was requested
pub fn select_node(nodes: &[RemoteNode], requested: Option<&str>) -> Result<String> {
    match requested {
        // A node may answer late; an explicit id is trusted even if unseen
        Some(id) => Ok(id.to_string()),
        None => nodes
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| anyhow!("No remote node discovered")),
    }
}
