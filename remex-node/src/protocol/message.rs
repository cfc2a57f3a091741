// Wire envelope shared by the discovery and command channels
//
// Every datagram and every stream payload is one JSON object carrying the
// protocol version, the protocol magic, the message type and the sender id.
// `dest` and `data` are optional.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use super::{PROTOCOL_MAGIC, PROTOCOL_VERSION};

/// Free-form key/value payload carried in the `data` field
pub type Payload = Map<String, Value>;

/// Kinds of messages exchanged between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Discovery request, broadcast periodically by clients
    Ping,
    /// Discovery answer carrying the remote node's attributes
    Pong,
    /// Ask a remote node to dial back to our command endpoint
    OpenConnection,
    /// Tell a remote node to drop its command connection
    CloseConnection,
    /// Command to execute, sent over the command connection
    Command,
    /// Result of a command, sent back over the command connection
    CommandResult,
}

impl MessageType {
    /// Wire name of this message type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::OpenConnection => "open_connection",
            MessageType::CloseConnection => "close_connection",
            MessageType::Command => "command",
            MessageType::CommandResult => "command_result",
        }
    }

    /// Parse a wire name, returning None for unknown types
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(MessageType::Ping),
            "pong" => Some(MessageType::Pong),
            "open_connection" => Some(MessageType::OpenConnection),
            "close_connection" => Some(MessageType::CloseConnection),
            "command" => Some(MessageType::Command),
            "command_result" => Some(MessageType::CommandResult),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a received payload is not a valid message of this protocol
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Missing mandatory field: {0}")]
    MissingField(&'static str),

    #[error("Protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: i64, found: String },

    #[error("Protocol magic mismatch: expected {expected:?}, found {found}")]
    MagicMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Reasons a message cannot be put on the wire
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Message source must not be empty")]
    MissingSource,

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    pub source: String,
    pub dest: Option<String>,
    pub data: Option<Payload>,
}

// Borrowed view used for encoding so no field has to be cloned
#[derive(Serialize)]
struct WireMessage<'a> {
    version: i64,
    magic: &'a str,
    #[serde(rename = "type")]
    message_type: MessageType,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Payload>,
}

impl Message {
    /// Create a broadcast message without payload
    pub fn new(message_type: MessageType, source: impl Into<String>) -> Self {
        Self {
            message_type,
            source: source.into(),
            dest: None,
            data: None,
        }
    }

    /// Address the message to a single node
    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    /// Encode to the UTF-8 JSON wire form
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.source.is_empty() {
            return Err(EncodeError::MissingSource);
        }
        let wire = WireMessage {
            version: PROTOCOL_VERSION,
            magic: PROTOCOL_MAGIC,
            message_type: self.message_type,
            source: &self.source,
            dest: self.dest.as_deref(),
            data: self.data.as_ref(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Decode a UTF-8 JSON payload, validating version and magic first
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let Value::Object(mut obj) = value else {
            return Err(DecodeError::Malformed("not a JSON object".to_string()));
        };

        match obj.get("version") {
            None => return Err(DecodeError::MissingField("version")),
            Some(v) if v.as_i64() == Some(PROTOCOL_VERSION) => {}
            Some(v) => {
                return Err(DecodeError::VersionMismatch {
                    expected: PROTOCOL_VERSION,
                    found: v.to_string(),
                })
            }
        }

        match obj.get("magic") {
            None => return Err(DecodeError::MissingField("magic")),
            Some(v) if v.as_str() == Some(PROTOCOL_MAGIC) => {}
            Some(v) => {
                return Err(DecodeError::MagicMismatch {
                    expected: PROTOCOL_MAGIC,
                    found: v.to_string(),
                })
            }
        }

        let message_type = match obj.get("type") {
            None | Some(Value::Null) => return Err(DecodeError::MissingField("type")),
            Some(Value::String(name)) => MessageType::from_wire(name)
                .ok_or_else(|| DecodeError::UnknownType(name.clone()))?,
            Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
        };

        let source = match obj.remove("source") {
            Some(Value::String(source)) if !source.is_empty() => source,
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(DecodeError::MissingField("source"))
            }
            Some(other) => {
                return Err(DecodeError::Malformed(format!(
                    "source must be a string, found {other}"
                )))
            }
        };

        let dest = match obj.remove("dest") {
            None | Some(Value::Null) => None,
            Some(Value::String(dest)) => Some(dest),
            Some(other) => {
                return Err(DecodeError::Malformed(format!(
                    "dest must be a string, found {other}"
                )))
            }
        };

        let data = match obj.remove("data") {
            None | Some(Value::Null) => None,
            Some(Value::Object(data)) => Some(data),
            Some(other) => {
                return Err(DecodeError::Malformed(format!(
                    "data must be an object, found {other}"
                )))
            }
        };

        Ok(Self {
            message_type,
            source,
            dest,
            data,
        })
    }

    /// True when a node with `local_id` should handle this message: it was not
    /// sent by that node and is either broadcast or addressed to it.
    pub fn passes_receive_filter(&self, local_id: &str) -> bool {
        if self.source == local_id {
            return false;
        }
        match self.dest.as_deref() {
            None | Some("") => true,
            Some(dest) => dest == local_id,
        }
    }

    /// Payload or an empty map
    pub fn into_data(self) -> Payload {
        self.data.unwrap_or_default()
    }
}
