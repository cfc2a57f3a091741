// Node Discovery Interface
//
// INTENTION: Define the interface the command channel needs from discovery:
// the currently visible remote nodes and unreliable signalling towards one of
// them. Discovery finds nodes; it does not manage command connections.

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::error::Result;

pub mod mock;
pub mod multicast_discovery;
pub mod node_registry;

pub use mock::{MockNodeDiscovery, Signal};
pub use multicast_discovery::{create_multicast_socket, MulticastDiscovery};
pub use node_registry::{NodeRegistry, RemoteNode};

/// Interface for node discovery mechanisms
#[async_trait]
pub trait NodeDiscovery: Send + Sync {
    /// Id this node uses as `source` on every message
    fn local_node_id(&self) -> &str;

    /// Snapshot of the remote nodes currently considered alive
    fn remote_nodes(&self) -> Vec<RemoteNode>;

    /// Ask `remote_node_id` to dial back to `command_endpoint`
    async fn broadcast_open_connection(
        &self,
        remote_node_id: &str,
        command_endpoint: SocketAddr,
    ) -> Result<()>;

    /// Tell `remote_node_id` to drop its command connection
    async fn broadcast_close_connection(&self, remote_node_id: &str) -> Result<()>;
}
