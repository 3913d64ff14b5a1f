//! Speech-to-Text
//!
//! Streaming transcription over the OpenAI-compatible realtime socket.

mod realtime;

pub use realtime::{RealtimeConfig, RealtimeTranscriber};
