//! Capability traits for the external engines
//!
//! The session core only talks to the generative services through these
//! traits, so production adapters and scripted test fakes are interchangeable.
//!
//! ```text
//! Speech Processing:
//!   - SpeechTranscriber: streaming Audio → TranscriptEvent channel
//!   - SpeechSynthesizer: Text → streamed audio chunks
//!
//! Language Models:
//!   - ReplyGenerator: Text → streamed reply text
//! ```

mod llm;
mod speech;

pub use llm::{ReplyGenerator, TextDeltaStream};
pub use speech::{
    AudioChunkStream, NoiseReductionMode, SpeechSynthesizer, SpeechTranscriber,
    TranscriptionChannel, TranscriptionConfig, TranscriptionEvents, TranscriptionSink,
};
