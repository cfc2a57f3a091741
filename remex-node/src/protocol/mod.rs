// Protocol Module
//
// Wire envelope, typed payloads and stream framing for the Remex protocol.
// Everything here is pure: no sockets, no tasks.

pub mod framing;
pub mod message;
pub mod payload;

pub use framing::{frame_status, FrameStatus};
pub use message::{DecodeError, EncodeError, Message, MessageType, Payload};
pub use payload::{CommandOutput, CommandRequest, CommandResult, ExecMode, OpenConnectionRequest};

/// Protocol version carried in every message; peers with another version are ignored
pub const PROTOCOL_VERSION: i64 = 1;

/// Protocol family tag carried in every message
pub const PROTOCOL_MAGIC: &str = "proto_py";

/// Size of a single socket read
pub const RECEIVE_BUFFER_SIZE: usize = 4096;
