// Multicast-based Node Discovery
//
// INTENTION: Find remote interpreter nodes on the local network. The channel
// periodically broadcasts `ping`, records every `pong` in the node registry,
// evicts nodes that went silent, and carries the `open_connection` /
// `close_connection` signals that negotiate a command connection.

use async_trait::async_trait;
use remex_common::logging::{Component, Logger};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time;

use super::{NodeDiscovery, NodeRegistry, RemoteNode};
use crate::config::SessionConfig;
use crate::error::{RemexError, Result};
use crate::protocol::{Message, MessageType, OpenConnectionRequest, RECEIVE_BUFFER_SIZE};

/// Create and configure a multicast socket for the configured group.
///
/// Address and port reuse are enabled so several local processes can share
/// the discovery port. Must be called from within a tokio runtime.
pub fn create_multicast_socket(config: &SessionConfig) -> Result<UdpSocket> {
    let group = match config.multicast_group.ip() {
        IpAddr::V4(ip) => ip,
        _ => {
            return Err(RemexError::Config(
                "Only IPv4 multicast is supported".to_string(),
            ))
        }
    };
    let port = config.multicast_group.port();

    // Create a socket with socket2 for low-level configuration
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    // SO_REUSEPORT is not available everywhere, SO_REUSEADDR is the fallback
    #[cfg(unix)]
    let _ = socket.set_reuse_port(true);

    let bind_addr = SocketAddr::new(config.multicast_bind_address, port);
    socket.bind(&bind_addr.into())?;

    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(config.multicast_ttl)?;
    if !config.multicast_interface.is_unspecified() {
        socket.set_multicast_if_v4(&config.multicast_interface)?;
    }
    socket.join_multicast_v4(&group, &config.multicast_interface)?;

    // Convert to std socket and then to tokio socket
    let std_socket: std::net::UdpSocket = socket.into();
    std_socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Multicast-based node discovery
pub struct MulticastDiscovery {
    node_id: String,
    config: SessionConfig,
    registry: Arc<NodeRegistry>,
    socket: Option<Arc<UdpSocket>>,
    running: Arc<AtomicBool>,
    loop_task: Option<JoinHandle<()>>,
    logger: Logger,
}

impl MulticastDiscovery {
    /// Create a closed discovery channel for `node_id`
    pub fn new(node_id: impl Into<String>, config: SessionConfig, logger: &Logger) -> Self {
        let registry = Arc::new(NodeRegistry::new(config.node_timeout));
        Self {
            node_id: node_id.into(),
            config,
            registry,
            socket: None,
            running: Arc::new(AtomicBool::new(false)),
            loop_task: None,
            logger: logger.with_component(Component::Discovery),
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Registry fed by this channel
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Local address of the discovery socket while open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Open the socket and start the discovery loop
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            self.logger.warn("Discovery channel is already open");
            return Ok(());
        }
        self.config.validate()?;

        let socket = Arc::new(create_multicast_socket(&self.config)?);
        self.logger.info(format!(
            "Joined multicast group {} (bind {}, ttl {})",
            self.config.multicast_group,
            self.config.multicast_bind_address,
            self.config.multicast_ttl
        ));

        self.running.store(true, Ordering::Release);
        let discovery_loop = DiscoveryLoop {
            node_id: self.node_id.clone(),
            socket: Arc::clone(&socket),
            group: self.config.multicast_group,
            registry: Arc::clone(&self.registry),
            running: Arc::clone(&self.running),
            ping_interval: self.config.ping_interval,
            receive_timeout: self.config.receive_timeout,
            loop_interval: self.config.loop_interval,
            registry_logger: self.logger.with_component(Component::Registry),
            logger: self.logger.clone(),
        };
        self.loop_task = Some(tokio::spawn(discovery_loop.run()));
        self.socket = Some(socket);
        Ok(())
    }

    /// Stop the loop, leave the group and forget every discovered node
    pub async fn close(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(task) = self.loop_task.take() {
            if let Err(e) = task.await {
                self.logger
                    .error(format!("Discovery loop terminated abnormally: {e}"));
            }
        }

        if let Some(socket) = self.socket.take() {
            if let IpAddr::V4(group) = self.config.multicast_group.ip() {
                if let Err(e) = socket.leave_multicast_v4(group, self.config.multicast_interface) {
                    self.logger
                        .debug(format!("Failed to leave multicast group {group}: {e}"));
                }
            }
            self.logger.info("Discovery channel closed");
        }

        self.registry.clear();
    }

    /// Encode and send one message to the multicast group
    async fn send(&self, message: &Message) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(RemexError::NotStarted)?;
        let data = message.encode()?;
        socket.send_to(&data, self.config.multicast_group).await?;
        Ok(())
    }
}

impl Drop for MulticastDiscovery {
    fn drop(&mut self) {
        // The loop observes the flag within one receive timeout and exits
        self.running.store(false, Ordering::Release);
    }
}

#[async_trait]
impl NodeDiscovery for MulticastDiscovery {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    fn remote_nodes(&self) -> Vec<RemoteNode> {
        self.registry.snapshot()
    }

    async fn broadcast_open_connection(
        &self,
        remote_node_id: &str,
        command_endpoint: SocketAddr,
    ) -> Result<()> {
        self.logger.debug(format!(
            "Broadcasting open_connection to {remote_node_id} for {command_endpoint}"
        ));
        let message = Message::new(MessageType::OpenConnection, self.node_id.as_str())
            .with_dest(remote_node_id)
            .with_data(OpenConnectionRequest::for_endpoint(command_endpoint).to_payload());
        self.send(&message).await
    }

    async fn broadcast_close_connection(&self, remote_node_id: &str) -> Result<()> {
        self.logger
            .debug(format!("Broadcasting close_connection to {remote_node_id}"));
        let message = Message::new(MessageType::CloseConnection, self.node_id.as_str())
            .with_dest(remote_node_id);
        self.send(&message).await
    }
}

// State moved into the spawned loop task
struct DiscoveryLoop {
    node_id: String,
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    registry: Arc<NodeRegistry>,
    running: Arc<AtomicBool>,
    ping_interval: Duration,
    receive_timeout: Duration,
    loop_interval: Duration,
    registry_logger: Logger,
    logger: Logger,
}

impl DiscoveryLoop {
    async fn run(self) {
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let mut last_ping: Option<Instant> = None;

        while self.is_running() {
            self.drain(&mut buf).await;

            let now = Instant::now();
            if last_ping.map_or(true, |at| now.duration_since(at) >= self.ping_interval) {
                self.ping().await;
                last_ping = Some(now);
            }

            for node_id in self.registry.evict_expired(Instant::now()) {
                self.registry_logger
                    .info(format!("Remote node {node_id} timed out"));
            }

            time::sleep(self.loop_interval).await;
        }
        self.logger.debug("Discovery loop stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // Handle every pending datagram; returns once a receive times out
    async fn drain(&self, buf: &mut [u8]) {
        while self.is_running() {
            match time::timeout(self.receive_timeout, self.socket.recv_from(buf)).await {
                Err(_) => return,
                Ok(Ok((len, src))) => self.handle_datagram(&buf[..len], src),
                Ok(Err(e)) => {
                    self.logger
                        .error(format!("Failed to receive multicast message: {e}"));
                    return;
                }
            }
        }
    }

    fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) {
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.logger
                    .debug_args(format_args!("Dropping datagram from {src}: {e}"));
                return;
            }
        };
        if !message.passes_receive_filter(&self.node_id) {
            return;
        }

        match message.message_type {
            MessageType::Pong => {
                self.logger.debug_args(format_args!(
                    "Pong from {} at {src}",
                    message.source
                ));
                let source = message.source.clone();
                self.registry
                    .update(&source, message.into_data(), Instant::now());
            }
            other => {
                self.logger.debug_args(format_args!(
                    "Ignoring {other} from {}",
                    message.source
                ));
            }
        }
    }

    async fn ping(&self) {
        let ping = Message::new(MessageType::Ping, self.node_id.as_str());
        match ping.encode() {
            Ok(data) => {
                if let Err(e) = self.socket.send_to(&data, self.group).await {
                    self.logger
                        .error(format!("Failed to send ping to {}: {e}", self.group));
                }
            }
            Err(e) => self.logger.error(format!("Failed to encode ping: {e}")),
        }
    }
}
