// Public modules
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

// Re-export the main types from the session module
pub use session::{RunOptions, Session};

// Re-export configuration and errors
pub use config::SessionConfig;
pub use error::{RemexError, Result};

// Re-export the protocol types callers work with
pub use protocol::{
    CommandRequest, CommandResult, ExecMode, Message, MessageType, Payload, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};

// Re-export the main types from the network module
pub use network::{
    ChannelState, CommandChannel, MockNodeDiscovery, MulticastDiscovery, NodeDiscovery,
    NodeRegistry, RemoteNode,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
