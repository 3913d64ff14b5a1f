//! Transport-neutral client connection messages
//!
//! Sessions read [`ClientMessage`]s from a stream and write
//! [`ServerMessage`]s to a sink, so the axum WebSocket and in-memory test
//! channels drive the same code.

use bytes::Bytes;

/// Close code sent when a session ends on a fatal error (internal error)
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Largest close reason a WebSocket control frame can carry
pub const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Message received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Raw PCM16 LE audio, 24 kHz mono
    Audio(Bytes),
    /// JSON control message
    Text(String),
    Close,
}

/// Message sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Synthesized PCM16 LE audio, 24 kHz mono
    Audio(Bytes),
    Close { code: u16, reason: String },
}

impl ServerMessage {
    /// Close frame for a fatal session error, with the reason truncated to
    /// fit a control frame
    pub fn internal_error(reason: &str) -> Self {
        ServerMessage::Close {
            code: CLOSE_INTERNAL_ERROR,
            reason: truncate_reason(reason).to_string(),
        }
    }
}

/// Cut `reason` to at most [`MAX_CLOSE_REASON_BYTES`] on a char boundary
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_reason_untouched() {
        assert_eq!(truncate_reason("upstream gone"), "upstream gone");
    }

    #[test]
    fn test_long_reason_truncated() {
        let reason = "x".repeat(300);
        assert_eq!(truncate_reason(&reason).len(), MAX_CLOSE_REASON_BYTES);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'é' is two bytes; 62 of them straddle the limit
        let reason = "é".repeat(62);
        let truncated = truncate_reason(&reason);
        assert_eq!(truncated.len(), 122);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_internal_error_close() {
        assert_eq!(
            ServerMessage::internal_error("boom"),
            ServerMessage::Close {
                code: 1011,
                reason: "boom".to_string()
            }
        );
    }
}
