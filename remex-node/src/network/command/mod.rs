// Command Module
//
// One-shot command execution over TCP. The listening side is negotiated via
// discovery signals; messages on the stream are bare JSON documents.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::error::{RemexError, Result};
use crate::protocol::{frame_status, FrameStatus, Message, RECEIVE_BUFFER_SIZE};

pub mod command_channel;

pub use command_channel::{ChannelState, CommandChannel};

/// Encode `message` and write it whole to `writer`
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = message.encode()?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one message from `reader`.
///
/// Reads accumulate until the buffer holds one complete JSON document, so a
/// message split across several TCP segments is still read whole. End of
/// stream before that point, undecodable bytes, or a message larger than
/// `max_message_size` are errors. With `timeout` set, the whole read is
/// bounded by it.
pub async fn read_message<R>(
    reader: &mut R,
    max_message_size: usize,
    timeout: Option<Duration>,
) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let frame = match timeout {
        Some(limit) => time::timeout(limit, read_frame(reader, max_message_size))
            .await
            .map_err(|_| RemexError::CommandTimeout(limit))??,
        None => read_frame(reader, max_message_size).await?,
    };
    Message::decode(&frame).map_err(|e| RemexError::InvalidResponse(e.to_string()))
}

async fn read_frame<R>(reader: &mut R, max_message_size: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(RECEIVE_BUFFER_SIZE);
    let mut chunk = vec![0u8; RECEIVE_BUFFER_SIZE];
    loop {
        let len = reader.read(&mut chunk).await?;
        if len == 0 {
            let reason = if buf.is_empty() {
                "connection closed"
            } else {
                "connection closed in the middle of a message"
            };
            return Err(RemexError::InvalidResponse(reason.to_string()));
        }
        buf.extend_from_slice(&chunk[..len]);

        match frame_status(&buf) {
            FrameStatus::Complete(frame_len) => {
                buf.truncate(frame_len);
                return Ok(buf);
            }
            FrameStatus::Incomplete if buf.len() > max_message_size => {
                return Err(RemexError::MessageTooLarge(max_message_size));
            }
            FrameStatus::Incomplete => {}
            FrameStatus::Invalid(reason) => return Err(RemexError::InvalidResponse(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use tokio::io::duplex;

    #[tokio::test]
    async fn reads_message_split_across_writes() {
        let message = Message::new(MessageType::CommandResult, "remote").with_dest("local");
        let bytes = message.encode().unwrap();
        let (mut client, mut server) = duplex(64);

        let writer = tokio::spawn(async move {
            for piece in bytes.chunks(7) {
                server.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let read = read_message(&mut client, 1024, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(read, message);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn eof_before_message_is_invalid_response() {
        let (mut client, server) = duplex(64);
        drop(server);
        let err = read_message(&mut client, 1024, None).await.unwrap_err();
        assert!(matches!(err, RemexError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let (mut client, mut server) = duplex(1024);
        server.write_all(b"{\"padding\": \"").await.unwrap();
        server.write_all(&[b'x'; 512]).await.unwrap();
        let err = read_message(&mut client, 100, None).await.unwrap_err();
        assert!(matches!(err, RemexError::MessageTooLarge(100)));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut client, _server) = duplex(64);
        let err = read_message(&mut client, 1024, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, RemexError::CommandTimeout(_)));
    }

    #[tokio::test]
    async fn foreign_json_is_invalid_response() {
        let (mut client, mut server) = duplex(256);
        server
            .write_all(br#"{"version": 1, "magic": "other", "type": "command_result", "source": "x"}"#)
            .await
            .unwrap();
        let err = read_message(&mut client, 1024, None).await.unwrap_err();
        assert!(matches!(err, RemexError::InvalidResponse(_)));
    }
}
