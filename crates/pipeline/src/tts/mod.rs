//! Text-to-Speech
//!
//! Streaming synthesis client for OpenAI-compatible speech endpoints.

mod streaming;

pub use streaming::{rechunk, OpenAISpeech, OpenAISpeechConfig};
