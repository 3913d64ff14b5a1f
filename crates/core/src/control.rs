//! Client control messages
//!
//! Text frames from the client are JSON objects with an `event` key.
//! Only `"end"` is recognized today; other tags are tolerated so that newer
//! clients keep working against this server.

use serde::Deserialize;

use crate::{Error, Result};

/// Event tag marking the end of the current input turn
pub const END_OF_TURN_EVENT: &str = "end";

/// Tagged control event sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// The current turn's audio input is complete
    EndOfTurn,
    /// A tag this server does not know; ignored
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct ControlEnvelope {
    event: String,
}

impl ControlMessage {
    /// Parse a text frame.
    ///
    /// Returns [`Error::Protocol`] when the payload is not a JSON object
    /// with a string `event` field.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: ControlEnvelope = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("invalid control message: {}", e)))?;

        Ok(match envelope.event.as_str() {
            END_OF_TURN_EVENT => ControlMessage::EndOfTurn,
            _ => ControlMessage::Unknown(envelope.event),
        })
    }
}
