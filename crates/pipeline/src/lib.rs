//! Turn pipeline for duplex voice sessions
//!
//! Components:
//! - Realtime transcription adapter (`stt`)
//! - Streaming speech synthesis client (`tts`)
//! - Turn orchestrator state machine (`orchestrator`)
//! - Per-turn artifact persistence (`persistence`)

pub mod orchestrator;
pub mod persistence;
pub mod stt;
pub mod telemetry;
pub mod tts;

pub use orchestrator::{TurnOrchestrator, TurnState, TurnStream};
pub use persistence::{OutputArtifact, SessionArtifacts, TurnRecorder};
pub use stt::{RealtimeConfig, RealtimeTranscriber};
pub use tts::{OpenAISpeech, OpenAISpeechConfig};

use thiserror::Error;

/// Errors raised by the upstream engine adapters
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<PipelineError> for duplex_voice_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Stt(msg) => duplex_voice_core::Error::Transcription(msg),
            PipelineError::Tts(msg) => duplex_voice_core::Error::Tts(msg),
            PipelineError::Configuration(msg) => duplex_voice_core::Error::UpstreamConnect(msg),
        }
    }
}
