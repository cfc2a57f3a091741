// Mock Node Discovery Implementation
//
// INTENTION: Provide an in-memory implementation of the NodeDiscovery trait
// for testing the command channel without multicast traffic.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{NodeDiscovery, NodeRegistry, RemoteNode};
use crate::error::Result;
use crate::protocol::Payload;

/// A signal sent through the mock instead of the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    OpenConnection {
        remote_node_id: String,
        command_endpoint: SocketAddr,
    },
    CloseConnection {
        remote_node_id: String,
    },
}

/// Called for every `open_connection` signal, standing in for the remote side
pub type OpenConnectionHook = Arc<dyn Fn(&str, SocketAddr) + Send + Sync>;

/// A mock implementation of NodeDiscovery that records signals in memory
pub struct MockNodeDiscovery {
    node_id: String,
    nodes: NodeRegistry,
    signals: Mutex<Vec<Signal>>,
    on_open_connection: Option<OpenConnectionHook>,
}

impl MockNodeDiscovery {
    /// Create a new mock discovery instance for `node_id`
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            nodes: NodeRegistry::new(Duration::MAX),
            signals: Mutex::new(Vec::new()),
            on_open_connection: None,
        }
    }

    /// Invoke `hook` whenever an `open_connection` signal is broadcast
    pub fn with_open_connection_hook(mut self, hook: OpenConnectionHook) -> Self {
        self.on_open_connection = Some(hook);
        self
    }

    /// Helper to make a remote node visible
    pub fn add_remote_node(&self, node_id: &str, attributes: Payload) {
        self.nodes.update(node_id, attributes, Instant::now());
    }

    /// All signals broadcast so far, oldest first
    pub fn signals(&self) -> Vec<Signal> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_connection_count(&self) -> usize {
        self.signals()
            .iter()
            .filter(|s| matches!(s, Signal::OpenConnection { .. }))
            .count()
    }

    pub fn close_connection_count(&self) -> usize {
        self.signals()
            .iter()
            .filter(|s| matches!(s, Signal::CloseConnection { .. }))
            .count()
    }

    fn record(&self, signal: Signal) {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }
}

#[async_trait]
impl NodeDiscovery for MockNodeDiscovery {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    fn remote_nodes(&self) -> Vec<RemoteNode> {
        self.nodes.snapshot()
    }

    async fn broadcast_open_connection(
        &self,
        remote_node_id: &str,
        command_endpoint: SocketAddr,
    ) -> Result<()> {
        self.record(Signal::OpenConnection {
            remote_node_id: remote_node_id.to_string(),
            command_endpoint,
        });
        if let Some(hook) = &self.on_open_connection {
            hook(remote_node_id, command_endpoint);
        }
        Ok(())
    }

    async fn broadcast_close_connection(&self, remote_node_id: &str) -> Result<()> {
        self.record(Signal::CloseConnection {
            remote_node_id: remote_node_id.to_string(),
        });
        Ok(())
    }
}
