//! The `sender>>payload\n` wire frame.
//!
//! Every message on the TCP stream is one newline-terminated line. The
//! part before the first `>>` is the sender's display name; everything
//! after it is the payload. The relay never interprets the payload.
//!
//! The sender string is chosen by the sending party. The name `Room` is
//! reserved for system notices emitted by the relay itself (for example
//! disconnect announcements); frontends should render it as a notice
//! rather than a peer's chat line.

use thiserror::Error;

/// Separator between the sender name and the payload.
pub const FRAME_SEPARATOR: &str = ">>";

/// Reserved sender name for relay-generated system notices.
pub const ROOM_SENDER: &str = "Room";

/// Default maximum size of a single encoded frame, in bytes.
pub const MAX_FRAME_BYTES: usize = 1024;

/// One complete chat message as it travels on the wire.
///
/// A `Frame` is an immutable value: produced once by a connection
/// handler (or by the relay for system notices), consumed once by the
/// router, never retained after broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Display name of the sending party.
    pub sender: String,

    /// Free-text message body. Must not contain a newline; a payload
    /// containing `>>` decodes intact as long as the sender part does
    /// not also contain it (splitting is on the first occurrence).
    pub payload: String,
}

impl Frame {
    /// Creates a frame from a sender name and payload.
    pub fn new(sender: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            payload: payload.into(),
        }
    }

    /// Creates a system notice from the reserved `Room` sender.
    pub fn room(payload: impl Into<String>) -> Self {
        Self::new(ROOM_SENDER, payload)
    }

    /// Returns `true` if this frame is a relay-generated system notice.
    pub fn is_system_notice(&self) -> bool {
        self.sender == ROOM_SENDER
    }

    /// Encodes the frame as a newline-terminated wire line.
    pub fn encode(&self) -> String {
        format!("{}{}{}\n", self.sender, FRAME_SEPARATOR, self.payload)
    }

    /// Decodes one wire line using the default size limit.
    ///
    /// See [`Frame::decode_with_limit`].
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        Self::decode_with_limit(line, MAX_FRAME_BYTES)
    }

    /// Decodes one wire line, enforcing `max_bytes` on the raw line.
    ///
    /// A single trailing `\n` (and `\r` for CRLF peers) is stripped
    /// before splitting on the first `>>` occurrence.
    ///
    /// # Errors
    ///
    /// - [`FrameError::TooLong`] if the raw line exceeds `max_bytes`
    /// - [`FrameError::MissingSeparator`] if no `>>` is present
    pub fn decode_with_limit(line: &str, max_bytes: usize) -> Result<Self, FrameError> {
        if line.len() > max_bytes {
            return Err(FrameError::TooLong {
                len: line.len(),
                max: max_bytes,
            });
        }

        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let (sender, payload) = line
            .split_once(FRAME_SEPARATOR)
            .ok_or(FrameError::MissingSeparator)?;

        Ok(Self::new(sender, payload))
    }
}

/// Errors that can occur while decoding a wire frame.
///
/// Both variants are frame-local: the offending line is dropped and the
/// connection carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The line contains no `>>` separator.
    #[error("missing '{FRAME_SEPARATOR}' separator")]
    MissingSeparator,

    /// The raw line exceeds the accepted frame size.
    #[error("frame too long: {len} bytes (max: {max})")]
    TooLong { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let frame = Frame::new("alice", "hello");
        assert_eq!(frame.encode(), "alice>>hello\n");
    }

    #[test]
    fn test_decode_strips_newline() {
        let frame = Frame::decode("alice>>hello\n").unwrap();
        assert_eq!(frame.sender, "alice");
        assert_eq!(frame.payload, "hello");
    }

    #[test]
    fn test_decode_strips_crlf() {
        let frame = Frame::decode("alice>>hello\r\n").unwrap();
        assert_eq!(frame.payload, "hello");
    }

    #[test]
    fn test_decode_without_newline() {
        // Buffered readers may hand over the line already trimmed.
        let frame = Frame::decode("alice>>hello").unwrap();
        assert_eq!(frame.sender, "alice");
        assert_eq!(frame.payload, "hello");
    }

    #[test]
    fn test_round_trip() {
        let frame = Frame::new("bob", "how are you?");
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decode_splits_on_first_separator() {
        // Payloads may themselves contain ">>"; only the first
        // occurrence is the split point.
        let frame = Frame::decode("alice>>1 >> 2\n").unwrap();
        assert_eq!(frame.sender, "alice");
        assert_eq!(frame.payload, "1 >> 2");
    }

    #[test]
    fn test_decode_empty_sender() {
        // The reference frontend sends lines without a sender prefix.
        let frame = Frame::decode(">>hi there\n").unwrap();
        assert_eq!(frame.sender, "");
        assert_eq!(frame.payload, "hi there");
    }

    #[test]
    fn test_decode_empty_payload() {
        let frame = Frame::decode("alice>>\n").unwrap();
        assert_eq!(frame.payload, "");
    }

    #[test]
    fn test_decode_missing_separator() {
        let err = Frame::decode("just some text\n").unwrap_err();
        assert_eq!(err, FrameError::MissingSeparator);
    }

    #[test]
    fn test_decode_too_long() {
        let line = format!("alice>>{}\n", "x".repeat(MAX_FRAME_BYTES));
        let err = Frame::decode(&line).unwrap_err();
        assert!(matches!(
            err,
            FrameError::TooLong {
                max: MAX_FRAME_BYTES,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_with_custom_limit() {
        assert!(Frame::decode_with_limit("alice>>hi\n", 64).is_ok());
        let err = Frame::decode_with_limit("alice>>hi\n", 4).unwrap_err();
        assert!(matches!(err, FrameError::TooLong { len: 10, max: 4 }));
    }

    #[test]
    fn test_room_notice() {
        let frame = Frame::room("127.0.0.1:9999 has disconnected.");
        assert!(frame.is_system_notice());
        assert_eq!(
            frame.encode(),
            "Room>>127.0.0.1:9999 has disconnected.\n"
        );
        assert!(!Frame::new("alice", "hi").is_system_notice());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            FrameError::MissingSeparator.to_string(),
            "missing '>>' separator"
        );
        let err = FrameError::TooLong { len: 2048, max: 1024 };
        assert_eq!(err.to_string(), "frame too long: 2048 bytes (max: 1024)");
    }
}
