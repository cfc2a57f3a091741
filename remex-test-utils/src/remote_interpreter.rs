// Mock remote interpreter
//
// INTENTION: Play the remote side of the protocol in tests. It answers `ping`
// with `pong`, dials back when asked through `open_connection`, runs each
// `command` through a pluggable evaluator and answers with `command_result`.

use anyhow::Result;
use remex_common::logging::{Component, Logger};
use remex_node::network::{create_multicast_socket, read_message, write_message};
use remex_node::protocol::{
    CommandRequest, CommandResult, Message, MessageType, OpenConnectionRequest, Payload,
    RECEIVE_BUFFER_SIZE,
};
use remex_node::SessionConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time;

const MAX_COMMAND_SIZE: usize = 1024 * 1024;

/// Computes the `command_result` payload for a command
pub type Evaluator = Arc<dyn Fn(&CommandRequest) -> Payload + Send + Sync>;

/// Evaluator answering every command with its own text
pub fn echo_evaluator() -> Evaluator {
    Arc::new(|request: &CommandRequest| CommandResult::success(request.command.clone()).to_payload())
}

/// Behaviour switches of a mock remote interpreter
#[derive(Debug, Clone)]
pub struct RemoteInterpreterOptions {
    /// Answer `ping` with `pong`
    pub answer_pings: bool,
    /// Dial back when an `open_connection` addressed to us arrives
    pub dial_back: bool,
    /// Extra attributes carried on every `pong`
    pub attributes: Payload,
}

impl Default for RemoteInterpreterOptions {
    fn default() -> Self {
        Self {
            answer_pings: true,
            dial_back: true,
            attributes: Payload::new(),
        }
    }
}

impl RemoteInterpreterOptions {
    pub fn silent() -> Self {
        Self {
            answer_pings: false,
            dial_back: false,
            attributes: Payload::new(),
        }
    }

    pub fn with_dial_back(mut self, dial_back: bool) -> Self {
        self.dial_back = dial_back;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Counters of what the mock remote interpreter has seen
#[derive(Debug, Default)]
pub struct RemoteStats {
    pings: AtomicUsize,
    open_connections: AtomicUsize,
    close_connections: AtomicUsize,
    commands: AtomicUsize,
}

impl RemoteStats {
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    pub fn close_connections(&self) -> usize {
        self.close_connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

/// A remote interpreter node living in the test process
pub struct MockRemoteInterpreter {
    node_id: String,
    running: Arc<AtomicBool>,
    stats: Arc<RemoteStats>,
    task: Option<JoinHandle<()>>,
}

impl MockRemoteInterpreter {
    /// Join the group of `config` and start answering as `node_id`
    pub async fn start(
        node_id: &str,
        config: &SessionConfig,
        options: RemoteInterpreterOptions,
        evaluator: Evaluator,
    ) -> Result<Self> {
        let socket = create_multicast_socket(config)?;
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(RemoteStats::default());

        let mut attributes = options.attributes.clone();
        attributes.insert("node_id".to_string(), Value::String(node_id.to_string()));

        let responder = Responder {
            node_id: node_id.to_string(),
            socket,
            group: config.multicast_group,
            options,
            attributes,
            evaluator,
            running: Arc::clone(&running),
            stats: Arc::clone(&stats),
            connections: HashMap::new(),
            logger: Logger::new_root(Component::Remote, node_id),
        };

        Ok(Self {
            node_id: node_id.to_string(),
            running,
            stats,
            task: Some(tokio::spawn(responder.run())),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn stats(&self) -> &RemoteStats {
        &self.stats
    }

    /// Stop answering and drop every command connection
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockRemoteInterpreter {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

struct Responder {
    node_id: String,
    socket: UdpSocket,
    group: SocketAddr,
    options: RemoteInterpreterOptions,
    attributes: Payload,
    evaluator: Evaluator,
    running: Arc<AtomicBool>,
    stats: Arc<RemoteStats>,
    connections: HashMap<String, JoinHandle<()>>,
    logger: Logger,
}

impl Responder {
    async fn run(mut self) {
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        while self.running.load(Ordering::SeqCst) {
            let received =
                time::timeout(Duration::from_millis(20), self.socket.recv_from(&mut buf)).await;
            let len = match received {
                Ok(Ok((len, _src))) => len,
                Ok(Err(e)) => {
                    self.logger.warn(format!("Receive failed: {e}"));
                    continue;
                }
                Err(_) => continue,
            };
            let Ok(message) = Message::decode(&buf[..len]) else {
                continue;
            };
            if message.passes_receive_filter(&self.node_id) {
                self.handle(message).await;
            }
        }

        for (_, connection) in self.connections.drain() {
            connection.abort();
        }
    }

    async fn handle(&mut self, message: Message) {
        match message.message_type {
            MessageType::Ping => {
                self.stats.pings.fetch_add(1, Ordering::SeqCst);
                if self.options.answer_pings {
                    let pong = Message::new(MessageType::Pong, self.node_id.as_str())
                        .with_dest(message.source)
                        .with_data(self.attributes.clone());
                    self.send(&pong).await;
                }
            }
            MessageType::OpenConnection => {
                self.stats.open_connections.fetch_add(1, Ordering::SeqCst);
                if self.options.dial_back {
                    self.dial_back(message);
                }
            }
            MessageType::CloseConnection => {
                self.stats.close_connections.fetch_add(1, Ordering::SeqCst);
                if let Some(connection) = self.connections.remove(&message.source) {
                    connection.abort();
                }
            }
            _ => {}
        }
    }

    fn dial_back(&mut self, message: Message) {
        if let Some(existing) = self.connections.get(&message.source) {
            if !existing.is_finished() {
                return;
            }
        }
        let endpoint = match message
            .data
            .as_ref()
            .ok_or_else(|| "missing data".to_string())
            .and_then(|data| OpenConnectionRequest::from_payload(data).map_err(|e| e.to_string()))
            .and_then(|request| request.endpoint().map_err(|e| e.to_string()))
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.logger.warn(format!("Bad open_connection: {e}"));
                return;
            }
        };

        let connection = dial_and_serve(
            endpoint,
            self.node_id.clone(),
            Arc::clone(&self.evaluator),
            Arc::clone(&self.stats),
        );
        self.connections.insert(message.source, connection);
    }

    async fn send(&self, message: &Message) {
        match message.encode() {
            Ok(data) => {
                if let Err(e) = self.socket.send_to(&data, self.group).await {
                    self.logger.warn(format!("Send failed: {e}"));
                }
            }
            Err(e) => self.logger.warn(format!("Encode failed: {e}")),
        }
    }
}

/// Connect to a command endpoint and serve commands on it in a new task
pub fn dial_and_serve(
    endpoint: SocketAddr,
    node_id: String,
    evaluator: Evaluator,
    stats: Arc<RemoteStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let logger = Logger::new_root(Component::Remote, &node_id);
        match TcpStream::connect(endpoint).await {
            Ok(stream) => serve_command_connection(stream, &node_id, evaluator, stats).await,
            Err(e) => logger.warn(format!("Failed to dial {endpoint}: {e}")),
        }
    })
}

/// Answer every `command` on `stream` until the other side hangs up
pub async fn serve_command_connection(
    mut stream: TcpStream,
    node_id: &str,
    evaluator: Evaluator,
    stats: Arc<RemoteStats>,
) {
    while let Ok(message) = read_message(&mut stream, MAX_COMMAND_SIZE, None).await {
        if !message.passes_receive_filter(node_id) || message.message_type != MessageType::Command
        {
            continue;
        }
        stats.commands.fetch_add(1, Ordering::SeqCst);

        let result = match CommandRequest::from_payload(&message.data.clone().unwrap_or_default()) {
            Ok(request) => evaluator(&request),
            Err(e) => CommandResult::failure(e.to_string()).to_payload(),
        };
        let reply = Message::new(MessageType::CommandResult, node_id)
            .with_dest(message.source)
            .with_data(result);
        if write_message(&mut stream, &reply).await.is_err() {
            break;
        }
    }
}
