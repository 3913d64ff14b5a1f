//! Error types shared by every crate in the workspace

use std::fmt;
use thiserror::Error;

/// Result alias using the core [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a turn that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnStage {
    /// Language-model reply generation
    Generating,
    /// Speech synthesis request
    Synthesizing,
    /// Consuming the synthesized audio stream
    Streaming,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Generating => "generating",
            TurnStage::Synthesizing => "synthesizing",
            TurnStage::Streaming => "streaming",
        }
    }
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline errors
///
/// Variants follow the propagation policy of the session: see
/// [`Error::is_session_fatal`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed client message. The turn is unaffected.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session directory or artifact file could not be created
    #[error("Storage error: {0}")]
    Storage(String),

    /// Handshake/configuration with an upstream engine failed
    #[error("Upstream connect error: {0}")]
    UpstreamConnect(String),

    /// The transcription channel was lost mid-session
    #[error("Upstream disconnected: {0}")]
    UpstreamDisconnected(String),

    /// LLM or TTS failed mid-turn; the turn is abandoned
    #[error("Pipeline error while {stage}: {message}")]
    Pipeline { stage: TurnStage, message: String },

    /// Writing an artifact failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// PCM/WAV conversion failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// No room for another session
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Sending to the client failed (client gone)
    #[error("Client connection error: {0}")]
    Client(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    /// Malformed or error message from the transcription engine
    #[error("Transcription error: {0}")]
    Transcription(String),
}

impl Error {
    /// Build a pipeline error for the given stage
    pub fn pipeline(stage: TurnStage, err: impl fmt::Display) -> Self {
        Error::Pipeline {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether this error ends the whole session.
    ///
    /// Errors local to one turn (pipeline, persistence, protocol, codec and
    /// the per-call service errors) are contained; errors on the shared
    /// upstream connection or the client connection are not.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::Storage(_)
                | Error::UpstreamConnect(_)
                | Error::UpstreamDisconnected(_)
                | Error::Capacity(_)
                | Error::Client(_)
        )
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::Codec(err.to_string())
    }
}
