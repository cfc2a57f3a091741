// Session
//
// INTENTION: The entry point used by tools that drive a remote interpreter.
// A session owns the discovery channel for its whole lifetime and at most one
// command channel at a time. `run_command` is one-shot: the session is
// stopped after every call, whatever the outcome.

use remex_common::logging::{Component, Logger};
use remex_common::node_ids::generate_node_id;
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::config::SessionConfig;
use crate::error::{RemexError, Result};
use crate::network::{CommandChannel, MulticastDiscovery, NodeDiscovery, RemoteNode};
use crate::protocol::{CommandResult, ExecMode, Payload};

/// Options for a single `run_command` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Ask the remote interpreter not to block on user interaction
    pub unattended: bool,
    /// How the remote interpreter should treat the command text
    pub exec_mode: ExecMode,
    /// Turn a result without `success: true` into `RemexError::CommandFailed`
    pub raise_on_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            unattended: true,
            exec_mode: ExecMode::ExecFile,
            raise_on_failure: false,
        }
    }
}

impl RunOptions {
    pub fn new(exec_mode: ExecMode) -> Self {
        Self {
            exec_mode,
            ..Self::default()
        }
    }

    pub fn with_unattended(mut self, unattended: bool) -> Self {
        self.unattended = unattended;
        self
    }

    pub fn with_raise_on_failure(mut self, raise_on_failure: bool) -> Self {
        self.raise_on_failure = raise_on_failure;
        self
    }
}

/// Discovery plus at most one command connection
pub struct Session {
    node_id: String,
    config: SessionConfig,
    discovery: Option<MulticastDiscovery>,
    command_channel: Option<CommandChannel>,
    logger: Logger,
}

impl Session {
    /// Create a stopped session with a fresh node id
    pub fn new(config: SessionConfig) -> Self {
        let node_id = generate_node_id();
        let logger = Logger::new_root(Component::Session, &node_id);
        Self {
            node_id,
            config,
            discovery: None,
            command_channel: None,
            logger,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.discovery.is_some()
    }

    /// Start discovery. Starting a started session does nothing.
    pub async fn start(&mut self) -> Result<()> {
        if self.discovery.is_some() {
            return Ok(());
        }
        let mut discovery = MulticastDiscovery::new(&self.node_id, self.config.clone(), &self.logger);
        discovery.open().await?;
        self.discovery = Some(discovery);
        self.logger.info("Session started");
        Ok(())
    }

    /// Close the command connection, then discovery. Stopping a stopped
    /// session does nothing.
    pub async fn stop(&mut self) {
        self.close_command_connection().await;
        if let Some(mut discovery) = self.discovery.take() {
            discovery.close().await;
            self.logger.info("Session stopped");
        }
    }

    /// Remote nodes currently visible; empty while stopped
    pub fn remote_nodes(&self) -> Vec<RemoteNode> {
        self.discovery
            .as_ref()
            .map(|d| d.remote_nodes())
            .unwrap_or_default()
    }

    /// Poll until at least one remote node is visible or `timeout` elapses
    pub async fn wait_for_remote_nodes(&self, timeout: Duration) -> Vec<RemoteNode> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.loop_interval.max(Duration::from_millis(10));
        loop {
            let nodes = self.remote_nodes();
            if !nodes.is_empty() || Instant::now() >= deadline {
                return nodes;
            }
            time::sleep(poll).await;
        }
    }

    pub fn has_command_connection(&self) -> bool {
        self.command_channel.is_some()
    }

    /// Open a command connection to `remote_node_id`, replacing any existing one
    pub async fn open_command_connection(&mut self, remote_node_id: &str) -> Result<()> {
        self.close_command_connection().await;
        let discovery = self.discovery.as_ref().ok_or(RemexError::NotStarted)?;

        let mut channel =
            CommandChannel::new(&self.node_id, remote_node_id, &self.config, &self.logger);
        match channel.open(discovery).await {
            Ok(()) => {
                self.command_channel = Some(channel);
                Ok(())
            }
            Err(e) => {
                channel.close(discovery).await;
                Err(e)
            }
        }
    }

    /// Close the command connection if one is open
    pub async fn close_command_connection(&mut self) {
        if let Some(mut channel) = self.command_channel.take() {
            match self.discovery.as_ref() {
                Some(discovery) => channel.close(discovery).await,
                None => self
                    .logger
                    .warn("Dropping command channel without a discovery channel"),
            }
        }
    }

    /// Run one command on the connected node, then stop the session.
    ///
    /// The stop happens on every exit path so sockets and the discovery loop
    /// are released even when the command fails.
    pub async fn run_command(&mut self, command: &str, options: RunOptions) -> Result<Payload> {
        let result = self.run_command_on_channel(command, options).await;
        self.stop().await;
        let data = result?;
        if options.raise_on_failure && !CommandResult::payload_succeeded(&data) {
            return Err(RemexError::CommandFailed(data));
        }
        Ok(data)
    }

    async fn run_command_on_channel(&mut self, command: &str, options: RunOptions) -> Result<Payload> {
        let channel = self
            .command_channel
            .as_mut()
            .ok_or(RemexError::NoOpenConnection)?;
        channel
            .run_command(command, options.unattended, options.exec_mode)
            .await
    }
}
