// Message boundaries on the command stream
//
// Peers write one JSON object per message with no length prefix. A reader
// accumulates bytes until the buffer holds one complete JSON document.

use serde::de::IgnoredAny;

/// Result of inspecting an accumulation buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// A complete document occupies the first `n` bytes
    Complete(usize),
    /// More bytes are needed
    Incomplete,
    /// The bytes can never form a JSON document
    Invalid(String),
}

/// Inspect `buf` for one complete JSON document at its start
pub fn frame_status(buf: &[u8]) -> FrameStatus {
    let mut documents = serde_json::Deserializer::from_slice(buf).into_iter::<IgnoredAny>();
    match documents.next() {
        None => FrameStatus::Incomplete,
        Some(Ok(_)) => FrameStatus::Complete(documents.byte_offset()),
        Some(Err(e)) if e.is_eof() => FrameStatus::Incomplete,
        Some(Err(e)) => FrameStatus::Invalid(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_document_reports_its_length() {
        let doc = br#"{"type": "command_result", "data": {"result": "}"}}"#;
        assert_eq!(frame_status(doc), FrameStatus::Complete(doc.len()));
    }

    #[test]
    fn split_document_is_incomplete() {
        let doc = br#"{"type": "command_result", "data": {"result": "2"}}"#;
        for cut in [1, 10, doc.len() - 1] {
            assert_eq!(frame_status(&doc[..cut]), FrameStatus::Incomplete);
        }
        assert_eq!(frame_status(b""), FrameStatus::Incomplete);
        assert_eq!(frame_status(b"  \n"), FrameStatus::Incomplete);
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(frame_status(b"}{"), FrameStatus::Invalid(_)));
    }
}
