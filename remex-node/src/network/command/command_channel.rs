// Command Channel
//
// INTENTION: Execute commands on one remote node over TCP. The local side
// listens; the remote side is asked through discovery to dial in. Once
// connected, every `run_command` sends one `command` and waits for exactly
// one `command_result`. There is no multiplexing, so calls are serialized
// through `&mut self`.

use remex_common::logging::{Component, Logger};
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

use super::{read_message, write_message};
use crate::config::SessionConfig;
use crate::error::{RemexError, Result};
use crate::network::discovery::NodeDiscovery;
use crate::protocol::{CommandRequest, ExecMode, Message, MessageType, Payload};

/// Lifecycle of a command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Listening,
    Connected,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Idle => "idle",
            ChannelState::Listening => "listening",
            ChannelState::Connected => "connected",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// TCP command connection to a single remote node
pub struct CommandChannel {
    local_node_id: String,
    remote_node_id: String,
    endpoint: SocketAddr,
    accept_timeout: Duration,
    accept_attempts: u32,
    command_timeout: Option<Duration>,
    max_message_size: usize,
    state: ChannelState,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    // The remote node has been asked to connect and not yet told to stand down
    close_pending: bool,
    logger: Logger,
}

impl CommandChannel {
    pub fn new(
        local_node_id: impl Into<String>,
        remote_node_id: impl Into<String>,
        config: &SessionConfig,
        logger: &Logger,
    ) -> Self {
        let remote_node_id = remote_node_id.into();
        Self {
            local_node_id: local_node_id.into(),
            logger: logger
                .with_component(Component::Command)
                .with_peer(remote_node_id.as_str()),
            remote_node_id,
            endpoint: config.command_endpoint,
            accept_timeout: config.accept_timeout,
            accept_attempts: config.accept_attempts,
            command_timeout: config.command_timeout,
            max_message_size: config.max_message_size,
            state: ChannelState::Idle,
            listener: None,
            stream: None,
            close_pending: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn remote_node_id(&self) -> &str {
        &self.remote_node_id
    }

    /// Address the listener is bound to, once listening
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the remote side of the accepted connection
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Listen on the command endpoint and ask the remote node to dial in.
    ///
    /// Each attempt broadcasts `open_connection` and waits one accept timeout.
    /// When every attempt times out the channel stays `listening`; the caller
    /// must `close()` it.
    pub async fn open(&mut self, discovery: &dyn NodeDiscovery) -> Result<()> {
        if self.state != ChannelState::Idle {
            return Err(RemexError::InvalidState(format!(
                "cannot open a {} command channel",
                self.state
            )));
        }

        let listener = bind_listener(self.endpoint)?;
        let listen_addr = listener.local_addr()?;
        self.listener = Some(listener);
        self.state = ChannelState::Listening;
        self.close_pending = true;
        self.logger
            .info(format!("Listening for command connection on {listen_addr}"));

        let (stream, peer) = self.accept_with_retries(discovery, listen_addr).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        self.state = ChannelState::Connected;
        self.logger
            .info(format!("Command connection established from {peer}"));
        Ok(())
    }

    async fn accept_with_retries(
        &self,
        discovery: &dyn NodeDiscovery,
        listen_addr: SocketAddr,
    ) -> Result<(TcpStream, SocketAddr)> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| RemexError::InvalidState("listener is not bound".to_string()))?;

        for attempt in 1..=self.accept_attempts {
            discovery
                .broadcast_open_connection(&self.remote_node_id, listen_addr)
                .await?;
            match time::timeout(self.accept_timeout, listener.accept()).await {
                Ok(accepted) => return Ok(accepted?),
                Err(_) => self.logger.debug(format!(
                    "No connection after attempt {attempt}/{}",
                    self.accept_attempts
                )),
            }
        }

        self.logger.warn(format!(
            "Remote node did not connect after {} attempts",
            self.accept_attempts
        ));
        Err(RemexError::RemoteDidNotConnect {
            attempts: self.accept_attempts,
        })
    }

    /// Send one command and wait for its result.
    ///
    /// Returns the `data` of the `command_result` verbatim. Any other reply,
    /// an undecodable reply, or the connection closing is an `InvalidResponse`.
    ///
    /// Any failure after the channel was found connected leaves the stream
    /// in an unknown position, so the stream is dropped and the channel moves
    /// to `closed`. A late reply can never be read by a later call.
    pub async fn run_command(
        &mut self,
        command: &str,
        unattended: bool,
        exec_mode: ExecMode,
    ) -> Result<Payload> {
        if self.state != ChannelState::Connected || self.stream.is_none() {
            return Err(RemexError::NotConnected(self.state.to_string()));
        }

        let result = self.exchange(command, unattended, exec_mode).await;
        if let Err(e) = &result {
            self.logger
                .warn(format!("Command failed, dropping the connection: {e}"));
            self.release_sockets().await;
        }
        result
    }

    async fn exchange(
        &mut self,
        command: &str,
        unattended: bool,
        exec_mode: ExecMode,
    ) -> Result<Payload> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RemexError::NotConnected(self.state.to_string()))?;

        let request = Message::new(MessageType::Command, self.local_node_id.as_str())
            .with_dest(self.remote_node_id.as_str())
            .with_data(CommandRequest::new(command, unattended, exec_mode).to_payload());
        self.logger
            .debug(format!("Sending {exec_mode} command ({} bytes)", command.len()));
        write_message(stream, &request).await?;

        let response = read_message(stream, self.max_message_size, self.command_timeout).await?;
        if !response.passes_receive_filter(&self.local_node_id) {
            return Err(RemexError::InvalidResponse(format!(
                "reply from {} was not addressed to this node",
                response.source
            )));
        }
        if response.message_type != MessageType::CommandResult {
            return Err(RemexError::InvalidResponse(format!(
                "expected command_result, got {}",
                response.message_type
            )));
        }
        Ok(response.into_data())
    }

    /// Signal the remote node and release both sockets
    pub async fn close(&mut self, discovery: &dyn NodeDiscovery) {
        if self.close_pending {
            // Best effort: the remote node may already be gone
            if let Err(e) = discovery
                .broadcast_close_connection(&self.remote_node_id)
                .await
            {
                self.logger
                    .warn(format!("Failed to broadcast close_connection: {e}"));
            }
            self.close_pending = false;
        }

        let was_open = self.state != ChannelState::Idle && self.state != ChannelState::Closed;
        self.release_sockets().await;
        if was_open {
            self.logger.info("Command channel closed");
        }
    }

    async fn release_sockets(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                self.logger
                    .debug(format!("Command stream shutdown failed: {e}"));
            }
        }
        self.listener = None;
        self.state = ChannelState::Closed;
    }
}

// Listener with address reuse and a backlog of one
fn bind_listener(endpoint: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(
        Domain::for_address(endpoint),
        Type::STREAM,
        Some(Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&endpoint.into())?;
    socket.listen(1)?;

    let std_listener: std::net::TcpListener = socket.into();
    std_listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(std_listener)?)
}
