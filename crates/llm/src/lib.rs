//! Reply generation for the duplex voice pipeline
//!
//! Features:
//! - OpenAI-compatible chat completions backend
//! - Server-sent event decoding into text deltas
//! - Adapter to the core `ReplyGenerator` trait

pub mod backend;
pub mod sse;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use sse::{SseDecoder, SseEvent};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for duplex_voice_core::Error {
    fn from(err: LlmError) -> Self {
        duplex_voice_core::Error::Llm(err.to_string())
    }
}
