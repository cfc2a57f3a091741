// Node registry: single source of truth for discovered remote nodes

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::protocol::Payload;

/// A discovered remote node
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNode {
    /// Node id, stable for the remote session's lifetime
    pub id: String,
    /// Payload of the most recent `pong` from this node
    pub attributes: Payload,
    /// When the most recent `pong` was processed
    pub last_seen: Instant,
}

impl RemoteNode {
    /// True when the node has been silent for longer than `timeout`
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Thread-safe map of remote nodes keyed by node id.
///
/// The discovery loop is the writer; any task may take snapshots.
pub struct NodeRegistry {
    nodes: Mutex<HashMap<String, RemoteNode>>,
    timeout: Duration,
}

impl NodeRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RemoteNode>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Liveness timeout applied by `evict_expired`
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Insert or overwrite the entry for `node_id`, resetting its last-seen time
    pub fn update(&self, node_id: &str, attributes: Payload, now: Instant) {
        self.lock().insert(
            node_id.to_string(),
            RemoteNode {
                id: node_id.to_string(),
                attributes,
                last_seen: now,
            },
        );
    }

    /// Remove every node silent for longer than the timeout; returns their ids
    pub fn evict_expired(&self, now: Instant) -> Vec<String> {
        let mut nodes = self.lock();
        let expired: Vec<String> = nodes
            .values()
            .filter(|node| node.is_expired(now, self.timeout))
            .map(|node| node.id.clone())
            .collect();
        for id in &expired {
            nodes.remove(id);
        }
        expired
    }

    /// Point-in-time copy of all nodes, ordered by id
    pub fn snapshot(&self) -> Vec<RemoteNode> {
        let mut nodes: Vec<RemoteNode> = self.lock().values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn get(&self, node_id: &str) -> Option<RemoteNode> {
        self.lock().get(node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
