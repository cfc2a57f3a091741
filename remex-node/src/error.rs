use std::time::Duration;
use thiserror::Error;

use crate::protocol::{EncodeError, Payload};

/// Error types for the remex_node crate
#[derive(Error, Debug)]
pub enum RemexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] EncodeError),

    #[error("Session is not started")]
    NotStarted,

    #[error("No open connection")]
    NoOpenConnection,

    #[error("Command channel is not connected (state: {0})")]
    NotConnected(String),

    #[error("Invalid command channel state: {0}")]
    InvalidState(String),

    #[error("Remote party failed to attempt the command socket connection after {attempts} attempts")]
    RemoteDidNotConnect { attempts: u32 },

    #[error("Remote party failed to send a valid response: {0}")]
    InvalidResponse(String),

    #[error("Remote party did not answer within {0:?}")]
    CommandTimeout(Duration),

    #[error("Message exceeds the maximum size of {0} bytes")]
    MessageTooLarge(usize),

    #[error("Remote command failed: {}", payload_to_string(.0))]
    CommandFailed(Payload),
}

fn payload_to_string(payload: &Payload) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| format!("{payload:?}"))
}

pub type Result<T> = std::result::Result<T, RemexError>;
