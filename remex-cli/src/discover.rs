//! Discover command for the Remex CLI
//!
//! Starts a session, waits for pongs and prints every visible node.

use anyhow::{Context, Result};
use remex_common::logging::Logger;
use remex_node::{RemoteNode, Session, SessionConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct DiscoverCommand {
    config: SessionConfig,
    logger: Arc<Logger>,
}

impl DiscoverCommand {
    pub fn new(config: SessionConfig, logger: Arc<Logger>) -> Self {
        Self { config, logger }
    }

    /// Listen for `wait` and return the nodes seen at the end of it
    pub async fn run(&self, wait: Duration) -> Result<Vec<RemoteNode>> {
        let mut session = Session::new(self.config.clone());
        session
            .start()
            .await
            .context("Failed to start discovery")?;
        self.logger.info(format!(
            "Listening on {} for {wait:?}",
            self.config.multicast_group
        ));

        tokio::time::sleep(wait).await;
        let nodes = session.remote_nodes();
        session.stop().await;

        self.logger
            .info(format!("Discovered {} remote node(s)", nodes.len()));
        Ok(nodes)
    }
}

/// One JSON object per node: its id and the attributes of its last pong
pub fn nodes_to_json(nodes: &[RemoteNode]) -> Value {
    Value::Array(
        nodes
            .iter()
            .map(|node| json!({"node_id": node.id, "attributes": node.attributes}))
            .collect(),
    )
}
